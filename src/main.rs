use clap::{Args, Parser, Subcommand};
use rawfit::config::{self, TranscodeConfig};
use rawfit::imaging::{Input, OutputFormat, ensure_extension};
use rawfit::pipeline::{TranscodeRequest, check_input, transcode_to_file};
use rawfit::raw::{ColorSpace, WhiteBalance};
use rawfit::security::SecurityPolicy;
use rawfit::{batch, output};
use std::path::{Path, PathBuf};

fn version_string() -> &'static str {
    let on_tag = env!("ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            // Leaked once at startup
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "rawfit")]
#[command(about = "Sandboxed RAW conversion and size-budgeted image transcoding")]
#[command(long_about = "\
Sandboxed RAW conversion and size-budgeted image transcoding

Images (PNG, JPEG, WebP, TIFF, BMP) are decoded and re-encoded as PNG or
JPEG, downscaling step by step until the output fits the byte budget.
Sony RAW files (.arw, .srf, .sr2) are first converted to PNG with an
allow-listed external converter (darktable-cli by default).

Every input path is checked before it is opened: no absolute paths unless
given directly on the command line, no '..' traversal, allowed extensions
only, and a size ceiling. 'batch' also skips hidden files and directories.

Settings come from stock defaults, then --config <file>, then flags.
Run 'rawfit gen-config' to print a documented config file.")]
#[command(version = version_string())]
struct Cli {
    /// Config file (TOML). Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// No logging
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

/// Flags that override `[encoding]`.
#[derive(Args, Clone, Default)]
struct EncodingArgs {
    /// Output format: lossless (png) or lossy (jpeg)
    #[arg(long)]
    format: Option<OutputFormat>,

    /// Output byte budget
    #[arg(long)]
    max_bytes: Option<u64>,

    /// Maximum output width in pixels
    #[arg(long)]
    max_width: Option<u32>,

    /// Maximum output height in pixels
    #[arg(long)]
    max_height: Option<u32>,

    /// JPEG quality, 1-100
    #[arg(long)]
    quality: Option<u32>,
}

/// Flags that override `[raw]`.
#[derive(Args, Clone, Default)]
struct RawArgs {
    /// PNG bit depth from the converter: 8 or 16
    #[arg(long)]
    bitness: Option<u32>,

    /// PNG compression level from the converter: 0-9
    #[arg(long)]
    compression: Option<u32>,

    /// sRGB, AdobeRGB, or ProPhoto
    #[arg(long)]
    color_space: Option<ColorSpace>,

    /// camera, auto, or manual
    #[arg(long)]
    white_balance: Option<WhiteBalance>,

    /// Leave the converter's temp output on disk
    #[arg(long)]
    keep_temp: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Transcode one image (or RAW file) to fit the byte budget
    Encode {
        input: PathBuf,
        /// Output path. Default: <input stem>-fit next to the input
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[command(flatten)]
        encoding: EncodingArgs,
        #[command(flatten)]
        raw: RawArgs,
    },
    /// Convert one RAW file to PNG without re-encoding
    ConvertRaw {
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        #[command(flatten)]
        raw: RawArgs,
    },
    /// Validate an input without transcoding it
    Check { input: PathBuf },
    /// Transcode every supported image under a directory
    Batch {
        source: PathBuf,
        output: PathBuf,
        /// Print the report as JSON instead of progress lines
        #[arg(long)]
        json: bool,
        #[command(flatten)]
        encoding: EncodingArgs,
        #[command(flatten)]
        raw: RawArgs,
    },
    /// Print a stock config file with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    setup_logging(cli.verbose, cli.quiet);

    let load = || config::load_config(cli.config.as_deref());

    match cli.command {
        Command::Encode {
            input,
            output: out,
            encoding,
            raw,
        } => {
            let mut config = load()?;
            apply_encoding_args(&mut config, &encoding);
            apply_raw_args(&mut config, &raw);
            config.validate()?;

            let (policy, relative) = policy_for_input(&config, &input);
            let target = out.unwrap_or_else(|| default_output(&input));
            let (written, result) = transcode_to_file(
                Input::Path(&relative),
                &target,
                &build_request(&config),
                &policy,
            )?;
            output::print_transcoded(&input, &written, &result);
        }
        Command::ConvertRaw {
            input,
            output: out,
            raw,
        } => {
            let mut config = load()?;
            apply_raw_args(&mut config, &raw);
            config.validate()?;

            let (policy, relative) = policy_for_input(&config, &input);
            let png = config.converter().convert(&relative, &config.raw, &policy)?;
            let target = ensure_extension(&out, OutputFormat::Lossless);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&target, &png)?;
            output::print_raw_conversion(&input, &target, png.len());
        }
        Command::Check { input } => {
            let config = load()?;
            let (policy, relative) = policy_for_input(&config, &input);
            let check = check_input(&relative, &policy)?;
            output::print_check(&input, &check);
        }
        Command::Batch {
            source,
            output: out,
            json,
            encoding,
            raw,
        } => {
            let mut config = load()?;
            apply_encoding_args(&mut config, &encoding);
            apply_raw_args(&mut config, &raw);
            config.validate()?;
            init_thread_pool(&config.batch);

            let policy = config.to_policy();
            let request = build_request(&config);
            let report = if json {
                batch::transcode_tree(&source, &out, &request, &policy, None)?
            } else {
                let (tx, rx) = std::sync::mpsc::channel();
                let printer = std::thread::spawn(move || {
                    for event in rx {
                        for line in output::format_batch_event(&event) {
                            println!("{}", line);
                        }
                    }
                });
                let report =
                    batch::transcode_tree(&source, &out, &request, &policy, Some(tx));
                printer
                    .join()
                    .map_err(|_| "progress printer thread panicked")?;
                report?
            };

            if json {
                println!("{}", report.to_json()?);
            } else {
                output::print_batch_summary(&report);
            }
            if report.failed() > 0 {
                let failed = report.failed();
                return Err(format!("{failed} of {} files failed", report.entries.len()).into());
            }
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

fn setup_logging(verbose: bool, quiet: bool) {
    if quiet {
        return;
    }

    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(level)
        .format_timestamp(None)
        .format_target(false)
        .init();
}

/// Initialize the rayon thread pool based on batch config.
///
/// Capped at the number of available CPU cores; users can constrain down, not up.
fn init_thread_pool(batch: &config::BatchConfig) {
    let threads = config::effective_threads(batch);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}

fn apply_encoding_args(config: &mut TranscodeConfig, args: &EncodingArgs) {
    let e = &mut config.encoding;
    if let Some(format) = args.format {
        e.format = format;
    }
    if let Some(max_bytes) = args.max_bytes {
        e.max_bytes = max_bytes;
    }
    if args.max_width.is_some() {
        e.max_width = args.max_width;
    }
    if args.max_height.is_some() {
        e.max_height = args.max_height;
    }
    if let Some(quality) = args.quality {
        e.quality = quality;
    }
}

fn apply_raw_args(config: &mut TranscodeConfig, args: &RawArgs) {
    let r = &mut config.raw;
    if let Some(bitness) = args.bitness {
        r.bitness = bitness;
    }
    if let Some(compression) = args.compression {
        r.compression = compression;
    }
    if let Some(color_space) = args.color_space {
        r.color_space = color_space;
    }
    if let Some(white_balance) = args.white_balance {
        r.white_balance = white_balance;
    }
    r.keep_temp |= args.keep_temp;
}

fn build_request(config: &TranscodeConfig) -> TranscodeRequest {
    TranscodeRequest::new(config.to_constraints())
        .with_raw_options(config.raw.clone())
        .with_converter(config.converter())
}

/// Policy for a single command-line input.
///
/// An absolute path named by the operator becomes the input root, leaving
/// only the file name to the relative-path checks. Relative paths are
/// checked as given.
fn policy_for_input(config: &TranscodeConfig, input: &Path) -> (SecurityPolicy, PathBuf) {
    let policy = config.to_policy();
    match (input.is_absolute(), input.parent(), input.file_name()) {
        (true, Some(parent), Some(name)) => (policy.with_input_root(parent), PathBuf::from(name)),
        _ => (policy, input.to_path_buf()),
    }
}

/// `photo.arw` → `photo-fit`; the encoder adds the extension.
fn default_output(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    input.with_file_name(format!("{stem}-fit"))
}
