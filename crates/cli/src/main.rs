use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use formvis_eval::{
    evaluate_document, normalize_field_rules, normalize_heading_rules, resolve_rules_for_state,
    DocumentInput, EngineConfig, HeadingBaseline, NormalizeOutcome, OptionRef, RuleDomain,
    SchemaIndex, VisibilityMap, VisibilityReport,
};
use formvis_interchange::FormSchema;

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

/// Rule domain selector for `normalize`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DomainArg {
    Heading,
    Field,
}

impl From<DomainArg> for RuleDomain {
    fn from(d: DomainArg) -> Self {
        match d {
            DomainArg::Heading => RuleDomain::Heading,
            DomainArg::Field => RuleDomain::Field,
        }
    }
}

/// Conditional-visibility rule engine for document-bound forms.
#[derive(Parser)]
#[command(
    name = "formvis",
    version,
    about = "Conditional-visibility rule engine for document-bound forms"
)]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    /// Log level filter (trace, debug, info, warn, error); RUST_LOG when absent
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Path to an engine configuration TOML file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Aggregate, normalize and evaluate rules, printing both visibility maps
    Eval {
        /// Path to the form schema JSON
        #[arg(long)]
        schema: PathBuf,
        /// Path to the value bag JSON
        #[arg(long)]
        values: PathBuf,
        /// Path to the stored rule state JSON
        #[arg(long)]
        rules: PathBuf,
        /// Path to the heading baseline JSON
        #[arg(long)]
        headings: Option<PathBuf>,
    },

    /// Print the canonical form of one domain's rules
    Normalize {
        /// Path to the form schema JSON
        #[arg(long)]
        schema: PathBuf,
        /// Path to the stored rule state JSON
        #[arg(long)]
        rules: PathBuf,
        /// Path to the heading baseline JSON
        #[arg(long)]
        headings: Option<PathBuf>,
        /// Rule domain to normalize
        #[arg(long, default_value = "heading", value_enum)]
        domain: DomainArg,
    },

    /// Resolve loose field and option references against a schema
    Resolve {
        /// Path to the form schema JSON
        #[arg(long)]
        schema: PathBuf,
        /// References to resolve
        #[arg(required = true)]
        refs: Vec<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    let filter = match cli.log_level.as_deref() {
        Some(level) => EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn")),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let config = load_config(cli.config.as_deref(), cli.output, cli.quiet);

    match cli.command {
        Commands::Eval {
            schema,
            values,
            rules,
            headings,
        } => {
            cmd_eval(
                &schema,
                &values,
                &rules,
                headings.as_deref(),
                &config,
                cli.output,
                cli.quiet,
            );
        }
        Commands::Normalize {
            schema,
            rules,
            headings,
            domain,
        } => {
            cmd_normalize(
                &schema,
                &rules,
                headings.as_deref(),
                domain.into(),
                &config,
                cli.output,
                cli.quiet,
            );
        }
        Commands::Resolve { schema, refs } => {
            cmd_resolve(&schema, &refs, cli.output, cli.quiet);
        }
    }
}

// ──────────────────────────────────────────────
// Input loading
// ──────────────────────────────────────────────

fn load_config(path: Option<&Path>, output: OutputFormat, quiet: bool) -> EngineConfig {
    let Some(path) = path else {
        return EngineConfig::default();
    };
    let text = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(_) => {
            let msg = format!("error: config file not found: {}", path.display());
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    };
    let config: EngineConfig = match toml::from_str(&text) {
        Ok(c) => c,
        Err(e) => {
            let msg = format!("error: invalid config in {}: {}", path.display(), e);
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    };
    if let Err(e) = config.validate() {
        let msg = format!("error: invalid config in {}: {}", path.display(), e);
        report_error(&msg, output, quiet);
        process::exit(1);
    }
    config
}

fn read_json(path: &Path, what: &str, output: OutputFormat, quiet: bool) -> serde_json::Value {
    let text = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(_) => {
            let msg = format!("error: {} file not found: {}", what, path.display());
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    };
    match serde_json::from_str(&text) {
        Ok(v) => v,
        Err(e) => {
            let msg = format!("error: invalid JSON in {}: {}", path.display(), e);
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    }
}

fn load_schema(path: &Path, output: OutputFormat, quiet: bool) -> FormSchema {
    let doc = read_json(path, "schema", output, quiet);
    match FormSchema::from_json(&doc) {
        Ok(schema) => schema,
        Err(e) => {
            let msg = format!("error: invalid schema in {}: {}", path.display(), e);
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    }
}

fn load_baseline(
    path: Option<&Path>,
    output: OutputFormat,
    quiet: bool,
) -> Option<HeadingBaseline> {
    path.map(|p| HeadingBaseline::from_json(&read_json(p, "headings", output, quiet)))
}

// ──────────────────────────────────────────────
// Commands
// ──────────────────────────────────────────────

fn cmd_eval(
    schema_path: &Path,
    values_path: &Path,
    rules_path: &Path,
    headings_path: Option<&Path>,
    config: &EngineConfig,
    output: OutputFormat,
    quiet: bool,
) {
    let input = DocumentInput {
        schema: load_schema(schema_path, output, quiet),
        values: read_json(values_path, "values", output, quiet),
        state: read_json(rules_path, "rules", output, quiet),
        headings: load_baseline(headings_path, output, quiet),
    };
    let report = evaluate_document(&input, config);

    if quiet {
        return;
    }
    match output {
        OutputFormat::Json => print_json(&report),
        OutputFormat::Text => print_report(&report),
    }
}

fn print_report(report: &VisibilityReport) {
    println!("headings:");
    print_map(&report.headings);
    println!("fields:");
    print_map(&report.fields);
    let rejected = report.rejected.heading.len() + report.rejected.field.len();
    if rejected > 0 {
        println!("rejected: {} rule(s)", rejected);
    }
}

fn print_map<K: Ord + std::fmt::Display>(map: &VisibilityMap<K>) {
    if map.is_empty() {
        println!("  (none)");
    }
    for (key, effect) in map.iter() {
        println!("  {:<24} {}", key.to_string(), effect);
    }
}

fn cmd_normalize(
    schema_path: &Path,
    rules_path: &Path,
    headings_path: Option<&Path>,
    domain: RuleDomain,
    config: &EngineConfig,
    output: OutputFormat,
    quiet: bool,
) {
    let schema = load_schema(schema_path, output, quiet);
    let state = read_json(rules_path, "rules", output, quiet);
    let baseline = load_baseline(headings_path, output, quiet);
    let aggregated = resolve_rules_for_state(&state, domain, config);

    if quiet {
        return;
    }
    match domain {
        RuleDomain::Heading => {
            let out = normalize_heading_rules(&schema, baseline.as_ref(), &aggregated.rules);
            print_outcome(&out, output, |t| match t.idx {
                Some(idx) => idx.to_string(),
                None => t.id.clone(),
            });
        }
        RuleDomain::Field => {
            let out = normalize_field_rules(&schema, &aggregated.rules);
            print_outcome(&out, output, |t| t.id.clone());
        }
    }
}

fn print_outcome<T: Serialize>(
    out: &NormalizeOutcome<T>,
    output: OutputFormat,
    target_key: impl Fn(&T) -> String,
) {
    match output {
        OutputFormat::Json => print_json(out),
        OutputFormat::Text => {
            for rule in &out.rules {
                let targets: Vec<String> = rule.targets.iter().map(&target_key).collect();
                println!(
                    "{} when {} {} {} -> {}",
                    wire_name(&rule.action),
                    rule.field_id(),
                    wire_name(&rule.op),
                    serde_json::to_string(&rule.expected).unwrap_or_default(),
                    targets.join(", ")
                );
            }
            for rejection in &out.rejected {
                println!("rejected [{}]: {}", rejection.position, rejection.reason);
            }
        }
    }
}

/// Serialized name of a unit enum variant.
fn wire_name<T: Serialize>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(s)) => s,
        _ => String::new(),
    }
}

#[derive(Serialize)]
struct Resolution<'r> {
    reference: &'r str,
    resolved: Option<OptionRef>,
}

fn cmd_resolve(schema_path: &Path, refs: &[String], output: OutputFormat, quiet: bool) {
    let schema = load_schema(schema_path, output, quiet);
    let index = SchemaIndex::new(&schema);
    let resolutions: Vec<Resolution> = refs
        .iter()
        .map(|r| Resolution {
            reference: r,
            resolved: index.parse_option_field_ref(r),
        })
        .collect();

    if quiet {
        return;
    }
    match output {
        OutputFormat::Json => print_json(&resolutions),
        OutputFormat::Text => {
            for r in &resolutions {
                match &r.resolved {
                    Some(found) => println!("{} -> {}", r.reference, found.id),
                    None => println!("{} -> (unresolved)", r.reference),
                }
            }
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{}", s),
        Err(e) => {
            report_error(&format!("error: {}", e), OutputFormat::Json, false);
            process::exit(1);
        }
    }
}

fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("{}", msg),
        OutputFormat::Json => {
            eprintln!("{}", serde_json::json!({ "error": msg }));
        }
    }
}
