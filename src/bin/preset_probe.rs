use anyhow::Context;
use clap::Parser;
use inspection_renamer::config::apply_debug_override;
use inspection_renamer::core::extractor::RegionExtractor;
use inspection_renamer::core::resolver::normalize_reg_number;
use inspection_renamer::core::validators::{derive_suffix, is_valid_reg_number, ExpiryDateParser};
use inspection_renamer::domain::model::{EXPIRY_DATE_FIELD, REG_NUMBER_FIELD};
use inspection_renamer::domain::ports::TextRecognizer;
use inspection_renamer::utils::logger::{self, LogFormat};
use inspection_renamer::utils::validation::Validate;
use inspection_renamer::{AnnotatedPageWriter, PdftoppmRenderer, RenamerConfig, TesseractCli};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "preset-probe")]
#[command(about = "Read one certificate with every preset and show what each one sees")]
struct Args {
    /// Certificate to probe (PDF or page image)
    document: PathBuf,

    /// TOML configuration file; built-in presets are used when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Only probe this preset
    #[arg(short, long)]
    preset: Option<String>,

    /// Write annotated page images to this directory
    #[arg(long, value_name = "DIR")]
    debug_images: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logger::init_cli_logger(args.verbose, LogFormat::Compact);

    let mut config = match &args.config {
        Some(path) => RenamerConfig::from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => RenamerConfig::default(),
    };
    apply_debug_override(&mut config, args.debug_images.as_deref());
    if let Err(e) = config.validate() {
        eprintln!("❌ {}", e.user_friendly_message());
        eprintln!("💡 建議: {}", e.recovery_suggestion());
        std::process::exit(1);
    }

    let mut extractor = RegionExtractor::new(
        PdftoppmRenderer::new(&config.rendering),
        TesseractCli::new(config.recognition.clone()),
        config.preprocess(),
    );
    if let (true, Some(dir)) = (config.debug.enabled, &config.debug.dir) {
        let writer = AnnotatedPageWriter::new(dir, config.debug.font_path.as_deref())
            .context("preparing the debug image directory")?;
        extractor = extractor.with_debug_sink(Box::new(writer));
    }

    if let Err(e) = extractor.recognizer().check_available() {
        eprintln!("❌ {}", e.user_friendly_message());
        eprintln!("💡 建議: {}", e.recovery_suggestion());
        std::process::exit(3);
    }

    let parser = ExpiryDateParser::new(&config.era)?;
    let document_name = args
        .document
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let presets = config
        .presets
        .iter()
        .filter(|p| args.preset.as_deref().map_or(true, |name| p.name == name));

    for preset in presets {
        println!("📋 {} ({} dpi)", preset.name, preset.dpi);

        let fields = match extractor.extract(&args.document, &document_name, preset) {
            Ok(fields) => fields,
            Err(e) => {
                println!("   ❌ extraction failed: {}", e);
                continue;
            }
        };

        for field in &fields.fields {
            println!("   {}: raw '{}' -> '{}'", field.field, field.raw, field.corrected);
        }

        let reg_number = normalize_reg_number(fields.get(REG_NUMBER_FIELD).unwrap_or_default());
        if is_valid_reg_number(&reg_number) {
            println!("   ✅ registration {} (suffix {})", reg_number, derive_suffix(&reg_number));
        } else {
            println!("   ❌ registration '{}' is malformed", reg_number);
        }

        match parser.parse(fields.get(EXPIRY_DATE_FIELD).unwrap_or_default()) {
            Ok(date) => match date.to_calendar_date() {
                Ok(_) => println!("   ✅ expiry {}", date.compact()),
                Err(e) => println!("   ❌ expiry: {}", e),
            },
            Err(e) => println!("   ❌ expiry: {}", e),
        }
    }

    Ok(())
}
