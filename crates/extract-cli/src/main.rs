use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use extract_client::ShopifyClient;
use extract_core::{FilterManager, FilterValue, Settings};
use extract_run::{preflight, RowFormat, RowSink, RunManager, SinkError};
use extract_store::IntermediateStore;

/// Pulls a Shopify shop's catalog and enrichment data and writes one joined
/// CSV row per variant.
#[derive(Debug, Parser)]
#[command(name = "extract-cli")]
#[command(about = "Shopify catalog extraction CLI")]
struct Cli {
    /// Shop subdomain, e.g. `acme-store` for `acme-store.myshopify.com`.
    #[arg(long, env = "SHOPIFY_SHOP_NAME")]
    shop_name: String,

    /// Admin API access token.
    #[arg(long, env = "SHOPIFY_OAUTH_TOKEN")]
    oauth_token: String,

    /// Output CSV path; writes to stdout when omitted.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Locale codes to pull translations for (repeatable).
    #[arg(long = "locale")]
    locales: Vec<String>,

    /// Narrow metafield pulls to a single namespace.
    #[arg(long)]
    namespace: Option<String>,

    #[arg(long)]
    meta: bool,
    #[arg(long)]
    collections: bool,
    #[arg(long)]
    collections_meta: bool,
    #[arg(long)]
    inventory_item: bool,
    #[arg(long)]
    inventory_level: bool,
    #[arg(long)]
    inventory_level_explode: bool,
    #[arg(long)]
    metafields_split_columns: bool,
    #[arg(long)]
    variant_names_split_columns: bool,
    #[arg(long)]
    use_gmc_transition_id: bool,
    #[arg(long)]
    use_metafield_namespaces: bool,
    #[arg(long)]
    force_bulk_pieces: bool,
    #[arg(long)]
    debug: bool,

    /// Default `true`; pass `--include-presentment-prices false` to disable.
    #[arg(long, default_value_t = true)]
    include_presentment_prices: bool,
    /// Default `true`; pass `--compare-price-override false` to disable.
    #[arg(long, default_value_t = true)]
    compare_price_override: bool,

    #[arg(long, default_value = ",")]
    delimiter: String,
    #[arg(long, default_value = "\"")]
    enclosure: String,

    /// Characters to strip from every output cell before it reaches the sink.
    #[arg(long, default_value = "")]
    strip_characters: String,

    /// YAML document whose top-level keys are the flat option map of spec
    /// §6; merged underneath the typed flags above, which always win.
    #[arg(long)]
    config_file: Option<PathBuf>,

    /// Additional raw `key=value` option overrides (repeatable), layered on
    /// top of `--config-file` but still overridden by any typed flag above.
    #[arg(long = "option", value_parser = parse_key_val)]
    options: Vec<(String, String)>,
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got {s:?}"))?;
    Ok((key.to_string(), value.to_string()))
}

/// Loads `--config-file` (if given) into a flat string map. Non-scalar YAML
/// values are rejected since the option map spec §6 describes is flat.
fn load_config_file(path: &std::path::Path) -> anyhow::Result<HashMap<String, String>> {
    let raw = std::fs::read_to_string(path)?;
    let doc: HashMap<String, serde_yaml::Value> = serde_yaml::from_str(&raw)?;
    let mut out = HashMap::new();
    for (k, v) in doc {
        let rendered = match v {
            serde_yaml::Value::String(s) => s,
            serde_yaml::Value::Bool(b) => b.to_string(),
            serde_yaml::Value::Number(n) => n.to_string(),
            serde_yaml::Value::Null => continue,
            other => anyhow::bail!("config-file key {k:?} has non-scalar value {other:?}"),
        };
        out.insert(k, rendered);
    }
    Ok(out)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let env_filter = EnvFilter::try_from_default_env().or_else(|_| {
        let level = std::env::var("EXTRACT_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        EnvFilter::try_new(level)
    })?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();
    let app_config = extract_core::load_app_config().unwrap_or_else(|e| {
        eprintln!("error: invalid configuration: {e}");
        std::process::exit(1);
    });

    let options = build_options(&cli)?;
    let high_precision_now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
        .to_string();
    let settings = Settings::parse(&options, &high_precision_now)?;

    let filters = build_filters(&cli)?;

    let shop_domain = format!("{}.myshopify.com", cli.shop_name);
    let client = ShopifyClient::new(
        &shop_domain,
        &app_config.shopify_api_version,
        &cli.oauth_token,
        app_config.http_timeout_secs,
        &app_config.http_user_agent,
    )?;

    let preflight_result = preflight::run(&client, &settings, &app_config.shopify_api_version).await?;

    let pool = extract_store::connect_pool_from_env().await?;
    let store = IntermediateStore::new(pool, &settings.table_prefix)?;

    let mut manager = RunManager::new(
        &client,
        &store,
        &settings,
        &filters,
        cli.locales.clone(),
        preflight_result.shop,
        preflight_result.has_publications_scope,
    );

    let mut sink = CsvSink::new(cli.output.as_deref(), &settings)?;
    manager.run(&mut sink).await?;
    sink.flush_inner()?;

    Ok(())
}

/// Builds the flat option map `Settings::parse` consumes (spec §6): starts
/// from `--config-file`, layers `--option key=value` on top, then the typed
/// flags win over both, matching the override order EXTERNAL INTERFACES
/// describes.
fn build_options(cli: &Cli) -> anyhow::Result<HashMap<String, String>> {
    let mut options = match &cli.config_file {
        Some(path) => load_config_file(path)?,
        None => HashMap::new(),
    };
    for (k, v) in &cli.options {
        options.insert(k.clone(), v.clone());
    }

    options.insert("shop_name".to_string(), cli.shop_name.clone());
    options.insert("oauth_token".to_string(), cli.oauth_token.clone());
    options.insert("delimiter".to_string(), cli.delimiter.clone());
    options.insert("enclosure".to_string(), cli.enclosure.clone());
    if !cli.strip_characters.is_empty() {
        options.insert("strip_characters".to_string(), cli.strip_characters.clone());
    }

    let mut set_bool = |key: &str, value: bool| {
        if value {
            options.insert(key.to_string(), "true".to_string());
        }
    };
    set_bool("meta", cli.meta);
    set_bool("collections", cli.collections);
    set_bool("collections_meta", cli.collections_meta);
    set_bool("inventory_item", cli.inventory_item);
    set_bool("inventory_level", cli.inventory_level);
    set_bool("inventory_level_explode", cli.inventory_level_explode);
    set_bool("metafields_split_columns", cli.metafields_split_columns);
    set_bool("variant_names_split_columns", cli.variant_names_split_columns);
    set_bool("use_gmc_transition_id", cli.use_gmc_transition_id);
    set_bool("use_metafield_namespaces", cli.use_metafield_namespaces);
    set_bool("force_bulk_pieces", cli.force_bulk_pieces);
    set_bool("debug", cli.debug);

    options.insert(
        "include_presentment_prices".to_string(),
        cli.include_presentment_prices.to_string(),
    );
    options.insert(
        "compare_price_override".to_string(),
        cli.compare_price_override.to_string(),
    );

    Ok(options)
}

fn build_filters(cli: &Cli) -> anyhow::Result<FilterManager> {
    let mut raw = HashMap::new();
    if let Some(namespace) = &cli.namespace {
        raw.insert("namespace".to_string(), FilterValue::Single(namespace.clone()));
    }
    Ok(FilterManager::new(raw)?)
}

/// A [`RowSink`] writing CSV rows to a file or stdout. Delimiter/quote are
/// fixed at construction from [`RowFormat::from_settings`] since the `csv`
/// writer has no notion of changing them mid-stream; `strip_characters` has
/// no `csv`-crate equivalent at all, so `write_row` applies it itself, per
/// cell, before handing the row to the writer.
struct CsvSink {
    writer: csv::Writer<Box<dyn Write>>,
}

impl CsvSink {
    fn new(path: Option<&std::path::Path>, settings: &Settings) -> anyhow::Result<Self> {
        let format = RowFormat::from_settings(settings);
        let dest: Box<dyn Write> = match path {
            Some(p) => Box::new(std::fs::File::create(p)?),
            None => Box::new(std::io::stdout()),
        };
        let writer = csv::WriterBuilder::new()
            .delimiter(format.delimiter)
            .quote(format.enclosure)
            .escape(format.escape)
            .from_writer(dest);
        Ok(Self { writer })
    }

    fn flush_inner(&mut self) -> anyhow::Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

impl RowSink for CsvSink {
    fn write_row(&mut self, cells: &[String], opts: &RowFormat) -> Result<(), SinkError> {
        let stripped: Vec<String> = cells.iter().map(|c| opts.strip(c)).collect();
        self.writer
            .write_record(&stripped)
            .map_err(|e| SinkError::Write(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_required_args() {
        let cli = Cli::try_parse_from([
            "extract-cli",
            "--shop-name",
            "acme",
            "--oauth-token",
            "shpat_x",
        ])
        .unwrap();
        assert_eq!(cli.shop_name, "acme");
        assert!(cli.include_presentment_prices);
        assert!(cli.compare_price_override);
    }

    #[test]
    fn build_options_only_sets_true_flags() {
        let cli = Cli::try_parse_from([
            "extract-cli",
            "--shop-name",
            "acme",
            "--oauth-token",
            "shpat_x",
            "--meta",
        ])
        .unwrap();
        let options = build_options(&cli).unwrap();
        assert_eq!(options.get("meta"), Some(&"true".to_string()));
        assert!(!options.contains_key("collections"));
    }

    #[test]
    fn raw_option_flags_are_merged_in() {
        let cli = Cli::try_parse_from([
            "extract-cli",
            "--shop-name",
            "acme",
            "--oauth-token",
            "shpat_x",
            "--option",
            "tax_rates={}",
        ])
        .unwrap();
        let options = build_options(&cli).unwrap();
        assert_eq!(options.get("tax_rates"), Some(&"{}".to_string()));
    }

    #[test]
    fn typed_flags_override_raw_options_of_the_same_key() {
        let cli = Cli::try_parse_from([
            "extract-cli",
            "--shop-name",
            "acme",
            "--oauth-token",
            "shpat_x",
            "--option",
            "delimiter=;",
        ])
        .unwrap();
        let options = build_options(&cli).unwrap();
        assert_eq!(options.get("delimiter"), Some(&",".to_string()));
    }

    #[test]
    fn config_file_is_loaded_and_overridden_by_option_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("opts.yaml");
        std::fs::write(&path, "namespace_hint: from_file\nmeta: \"true\"\n").unwrap();
        let cli = Cli::try_parse_from([
            "extract-cli",
            "--shop-name",
            "acme",
            "--oauth-token",
            "shpat_x",
            "--config-file",
            path.to_str().unwrap(),
            "--option",
            "namespace_hint=from_option",
        ])
        .unwrap();
        let options = build_options(&cli).unwrap();
        assert_eq!(options.get("namespace_hint"), Some(&"from_option".to_string()));
        assert_eq!(options.get("meta"), Some(&"true".to_string()));
    }

    #[test]
    fn build_filters_sets_namespace_override() {
        let cli = Cli::try_parse_from([
            "extract-cli",
            "--shop-name",
            "acme",
            "--oauth-token",
            "shpat_x",
            "--namespace",
            "custom",
        ])
        .unwrap();
        let filters = build_filters(&cli).unwrap();
        assert_eq!(filters.value("namespace"), Some("custom"));
    }
}
