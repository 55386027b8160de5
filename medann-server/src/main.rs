#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use clap::{parser::ValueSource, ArgMatches, CommandFactory, FromArgMatches, Parser, Subcommand};
use medann::config::StorageFormat;
use medann::{display_name, Classifier, CorpusStore, FeatureExtractor, Ingestor, MedannConfig};
use medann_http::dto::ClassifyResponse;
use medann_http::server::{init_tracing, DEFAULT_BODY_LIMIT_MB};
use medann_http::{serve, ServeOptions};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "medann", version, about = "k-NN chest X-ray classifier")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Directory holding `<label>_embeddings.<json|csv>` files.
    #[arg(long, env = "MEDANN_EMBEDDINGS_DIR", default_value = "./embeddings", global = true)]
    embeddings_dir: String,

    /// Config file. Defaults to `medann.json` inside the embeddings directory,
    /// which is optional; an explicit `--config` must exist and validate.
    #[arg(long, env = "MEDANN_CONFIG", global = true)]
    config: Option<String>,

    #[arg(long, env = "MEDANN_BIND_ADDR", global = true)]
    bind_addr: Option<String>,
    #[arg(long, env = "MEDANN_PORT", global = true)]
    port: Option<u16>,

    /// Bind to 127.0.0.1:0 (OS-assigned ephemeral port).
    #[arg(long, global = true)]
    auto_port: bool,

    /// Maximum upload size in megabytes.
    #[arg(long, default_value_t = DEFAULT_BODY_LIMIT_MB, global = true)]
    max_body_mb: usize,
}

#[derive(Subcommand)]
enum Command {
    /// Embed every image under the data directory, one file per class
    Embed {
        /// Directory with one subdirectory of images per class.
        #[arg(long, env = "MEDANN_DATA_DIR", default_value = "./data")]
        data_dir: String,
        /// Output format: json or csv. Overrides the config file.
        #[arg(long, value_parser = parse_format)]
        format: Option<StorageFormat>,
    },
    /// Classify a single image against the stored corpus
    Classify {
        image: PathBuf,
        /// Number of voting neighbors. Defaults to the configured default_k.
        #[arg(short, long)]
        k: Option<usize>,
        /// Print the result as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Start the HTTP server (the default when no command is given)
    Serve,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cmd = Cli::command();
    let matches = cmd.get_matches();
    let cli = Cli::from_arg_matches(&matches)?;

    init_tracing();
    let config = load_config(&cli)?;

    let embeddings_dir = Path::new(&cli.embeddings_dir);
    match &cli.command {
        Some(Command::Embed { data_dir, format }) => {
            run_embed(&config, Path::new(data_dir), embeddings_dir, *format)
        }
        Some(Command::Classify { image, k, json }) => {
            run_classify(&config, embeddings_dir, image, *k, *json)
        }
        Some(Command::Serve) | None => {
            let bind_addr = resolve_bind_addr(&cli, &matches)
                .map_err(|msg| std::io::Error::new(std::io::ErrorKind::InvalidInput, msg))?;
            let classifier = load_classifier(&config, embeddings_dir)?;
            serve(
                classifier,
                ServeOptions {
                    bind_addr,
                    body_limit_mb: cli.max_body_mb,
                    embeddings_dir: cli.embeddings_dir.clone(),
                },
            )
            .await
        }
    }
}

fn parse_format(raw: &str) -> Result<StorageFormat, String> {
    StorageFormat::from_extension(raw).ok_or_else(|| format!("unknown format {raw:?}, expected json or csv"))
}

fn load_config(cli: &Cli) -> Result<MedannConfig, medann::MedannError> {
    match &cli.config {
        Some(path) => MedannConfig::load(Path::new(path)),
        None => Ok(MedannConfig::load_or_default(Path::new(&cli.embeddings_dir))),
    }
}

fn run_embed(
    config: &MedannConfig,
    data_dir: &Path,
    output_dir: &Path,
    format: Option<StorageFormat>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut ingest = config.ingest.clone();
    if let Some(format) = format {
        ingest.format = format;
    }
    let extractor = FeatureExtractor::from_config(config)?;
    let report = Ingestor::new(extractor, ingest).run(data_dir, output_dir)?;

    for (label, count) in &report.classes {
        println!("{label}: {count} embeddings");
    }
    if !report.failures.is_empty() {
        eprintln!(
            "{} file(s) could not be processed, see {}",
            report.failures.len(),
            output_dir.join(&config.ingest.error_log).display()
        );
    }
    Ok(())
}

fn load_classifier(
    config: &MedannConfig,
    embeddings_dir: &Path,
) -> Result<Classifier, medann::MedannError> {
    let extractor = FeatureExtractor::from_config(config)?;
    let report = CorpusStore::new(embeddings_dir).load_dir()?;
    for failure in &report.failures {
        tracing::warn!(path = %failure.path.display(), error = %failure.error, "Corpus file skipped");
    }
    let corpus = report.corpus.build(&config.index)?;
    Classifier::new(extractor, corpus, config.classifier.clone())
}

fn run_classify(
    config: &MedannConfig,
    embeddings_dir: &Path,
    image: &Path,
    k: Option<usize>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let classifier = load_classifier(config, embeddings_dir)?;
    let k = k.unwrap_or_else(|| classifier.default_k());
    let prediction = classifier.classify_path(image, k)?;

    if json {
        let response = ClassifyResponse::from(prediction);
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    println!("Predicted class: {}", display_name(&prediction.label));
    println!("Neighbor class counts (k = {}):", prediction.k);
    for (label, count) in &prediction.counts {
        println!("  - {}: {} neighbors", display_name(label), count);
    }
    Ok(())
}

fn resolve_bind_addr(cli: &Cli, matches: &ArgMatches) -> Result<String, String> {
    if cli.auto_port && is_set_on_command_line(matches, "bind_addr") {
        return Err("--auto-port cannot be used with --bind-addr".to_string());
    }

    if cli.auto_port && is_set_on_command_line(matches, "port") {
        return Err("--auto-port cannot be used with --port".to_string());
    }

    if cli.auto_port {
        return Ok("127.0.0.1:0".to_string());
    }

    if let Some(bind_addr) = cli.bind_addr.as_ref().filter(|_| is_set_on_command_line(matches, "bind_addr")) {
        return Ok(bind_addr.clone());
    }

    if let Some(port) = cli.port.filter(|_| is_set_on_command_line(matches, "port")) {
        return Ok(format!("127.0.0.1:{port}"));
    }

    if let Some(bind_addr) = &cli.bind_addr {
        return Ok(bind_addr.clone());
    }

    if let Some(port) = cli.port {
        return Ok(format!("127.0.0.1:{port}"));
    }

    Ok("127.0.0.1:8501".to_string())
}

fn is_set_on_command_line(matches: &ArgMatches, arg: &str) -> bool {
    matches.value_source(arg) == Some(ValueSource::CommandLine)
}
