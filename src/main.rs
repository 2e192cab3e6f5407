use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{ArgGroup, Parser};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use web_scan_rs::types::{ProbeConfig, DEFAULT_USER_AGENT};
use web_scan_rs::{aggregate, nmap, prober, report, targets};

/// web-scan-rs — probe HTTP(S) endpoints and triage them with a searchable,
/// sortable HTML report.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "web-scan-rs",
    version,
    about = "Probe HTTP(S) endpoints and triage them with a searchable, sortable HTML report.",
    group(ArgGroup::new("input").required(true).args(["nmap_xml", "host_list"]))
)]
struct Cli {
    /// Use an Nmap XML file as input.
    #[arg(short = 'x', long = "xml", value_name = "FILE")]
    nmap_xml: Option<PathBuf>,

    /// Text file with one IP, hostname, or URL per line.
    #[arg(short = 'l', long = "list", value_name = "FILE")]
    host_list: Option<PathBuf>,

    /// Ports to probe. Default 80 and 443.
    #[arg(short = 'p', long, num_args = 1.., value_parser = clap::value_parser!(u16).range(1..), default_values_t = [80u16, 443])]
    ports: Vec<u16>,

    /// Max concurrent probes.
    #[arg(short = 'c', long, default_value_t = 10)]
    concurrency: usize,

    /// Per-endpoint timeout in seconds.
    #[arg(short = 'T', long, default_value_t = 5)]
    timeout: u64,

    /// Report path. Default is date/time based.
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// User-Agent string sent with every probe.
    #[arg(short = 'u', long = "user-agent", default_value = DEFAULT_USER_AGENT)]
    user_agent: String,

    /// Do not follow redirects (followed by default; also hides the redirect column).
    #[arg(short = 'r', long = "no-redirect", default_value_t = false)]
    no_redirect: bool,

    /// Validate TLS certificates. Default false.
    #[arg(short = 'k', long = "validate", default_value_t = false)]
    validate_certs: bool,

    /// Add an editable notes column to every report table.
    #[arg(short = 'n', long, default_value_t = false)]
    notes: bool,

    /// Also write the raw results as pretty JSON to this path.
    #[arg(long, value_name = "FILE")]
    json: Option<PathBuf>,

    /// Per-endpoint diagnostics on stderr.
    #[arg(short = 'v', long, default_value_t = false)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let started = Instant::now();
    let stamp = report::report_stamp();
    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(format!("webscan_report_{stamp}.html")));

    let target_set = load_targets(&cli)?;
    if target_set.skipped > 0 {
        println!(
            "[*] {} input line(s) skipped as unparseable",
            target_set.skipped
        );
    }
    if target_set.is_empty() {
        bail!("no targets: input produced zero probeable endpoints");
    }

    let config = ProbeConfig {
        timeout: Duration::from_secs(cli.timeout),
        verify_tls: cli.validate_certs,
        follow_redirects: !cli.no_redirect,
        user_agent: cli.user_agent.clone(),
        concurrency: cli.concurrency,
    };
    config.validate()?;

    // Ctrl-C closes the token; workers notice between probes and drain.
    let cancel = CancellationToken::new();
    let cancel_ctrlc = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        cancel_ctrlc.cancel();
    });

    let results = prober::probe_all_with_cancel(&target_set.uris, &config, cancel).await?;
    println!("[*] {} hosts scanned", results.submitted);
    println!(
        "[*] Scan time: {:.2} seconds",
        started.elapsed().as_secs_f64()
    );

    let tables = aggregate::aggregate(results.records.values());
    let model = report::build_model(&results, tables, config.follow_redirects, cli.notes);
    report::write_html_report(&output, &model, &stamp)?;

    if let Some(json_path) = cli.json.as_deref() {
        report::write_results_json(json_path, &results)?;
        println!("[*] JSON results written to {}", json_path.display());
    }

    println!(
        "[*] Total run time: {:.2} seconds",
        started.elapsed().as_secs_f64()
    );
    println!("[*] Report written to {}", output.display());
    Ok(())
}

fn load_targets(cli: &Cli) -> Result<targets::TargetSet> {
    if let Some(path) = cli.nmap_xml.as_deref() {
        let xml = fs::read_to_string(path)
            .with_context(|| format!("failed to read Nmap XML: {}", path.display()))?;
        let hosts = nmap::parse_scan_xml(&xml)?;
        Ok(targets::from_scan_hosts(&hosts, &cli.ports))
    } else if let Some(path) = cli.host_list.as_deref() {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read host list: {}", path.display()))?;
        Ok(targets::from_lines(text.lines(), &cli.ports))
    } else {
        bail!("either --xml or --list is required");
    }
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "web_scan_rs=debug"
    } else {
        "web_scan_rs=warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
