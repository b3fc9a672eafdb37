use clap::Parser;
use inspection_renamer::adapters::renderer::is_raster_image;
use inspection_renamer::core::extractor::RegionExtractor;
use inspection_renamer::core::matching::MatchTable;
use inspection_renamer::domain::model::{BatchRequest, Upload};
use inspection_renamer::domain::ports::Storage;
use inspection_renamer::utils::error::{ErrorSeverity, RenamerError};
use inspection_renamer::utils::{logger, validation::Validate};
use inspection_renamer::{
    AnnotatedPageWriter, BatchEngine, CliConfig, LocalStorage, PdftoppmRenderer, RenamePipeline,
    RenamerConfig, TesseractCli,
};
use std::path::Path;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = CliConfig::parse();

    // 初始化日誌
    logger::init_cli_logger(cli.verbose, cli.log_format);

    tracing::info!("Starting inspection-renamer");
    if cli.verbose {
        tracing::debug!("CLI config: {:?}", cli);
    }

    // 驗證參數與配置
    let config = match cli.validate().and_then(|_| cli.load_config()) {
        Ok(config) => config,
        Err(e) => exit_with(&e, None),
    };
    if let Err(e) = config.validate() {
        exit_with(&e, None);
    }

    if cli.list_presets {
        print_presets(&config);
        return Ok(());
    }

    let inputs = LocalStorage::new("");
    let output = LocalStorage::new(&cli.output);

    let request = match read_request(&cli, &inputs) {
        Ok(request) => request,
        Err(e) => exit_with(&e, Some((&output, &config))),
    };

    if cli.dry_run {
        tracing::info!("🔍 DRY RUN MODE - No recognition will run");
        perform_dry_run(&config, &request);
        return Ok(());
    }

    if cli.monitor {
        tracing::info!("🔍 System monitoring enabled");
    }

    let mut extractor = RegionExtractor::new(
        PdftoppmRenderer::new(&config.rendering),
        TesseractCli::new(config.recognition.clone()),
        config.preprocess(),
    );
    if config.debug.enabled {
        if let Some(dir) = &config.debug.dir {
            match AnnotatedPageWriter::new(dir, config.debug.font_path.as_deref()) {
                Ok(writer) => extractor = extractor.with_debug_sink(Box::new(writer)),
                Err(e) => exit_with(&e, Some((&output, &config))),
            }
        }
    }

    let pipeline = match RenamePipeline::new(extractor, &config) {
        Ok(pipeline) => pipeline,
        Err(e) => exit_with(&e, Some((&output, &config))),
    };
    let engine = BatchEngine::new_with_monitoring(pipeline, cli.monitor);

    let run = match engine.run(request) {
        Ok(run) => run,
        Err(e) => exit_with(&e, Some((&output, &config))),
    };

    if let Err(e) = output.write_file(run.output.file_name(), run.output.bytes()) {
        exit_with(&e, None);
    }
    let written = output.resolve(run.output.file_name());
    tracing::info!("📁 Output saved to: {}", written.display());
    println!("✅ {} renamed, {} failed", run.report.renamed, run.report.failed);
    println!("📁 Output saved to: {}", written.display());

    if let Some(report_path) = &cli.report {
        let json = serde_json::to_vec_pretty(&run.report)?;
        std::fs::write(report_path, json)?;
        tracing::info!("📝 Report written to: {}", report_path.display());
    }

    Ok(())
}

fn read_request(cli: &CliConfig, storage: &LocalStorage) -> inspection_renamer::Result<BatchRequest> {
    let read = |path: &Path| -> inspection_renamer::Result<Upload> {
        let bytes = storage.read_file(&path.to_string_lossy())?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Upload::new(name, bytes))
    };

    let documents = cli
        .documents
        .iter()
        .map(|path| read(path))
        .collect::<inspection_renamer::Result<Vec<_>>>()?;
    let lookup = cli.lookup.as_deref().map(|path| read(path)).transpose()?;

    Ok(BatchRequest {
        documents,
        lookup,
        preset: cli.preset.clone(),
    })
}

fn print_presets(config: &RenamerConfig) {
    println!("📋 Presets (default: {})", config.default_preset);
    for preset in &config.presets {
        println!(
            "  • {} - {} dpi, page {}x{}",
            preset.name, preset.dpi, preset.size.0, preset.size.1
        );
        for (field, region) in &preset.regions {
            println!("      {}: {}", field, region);
        }
    }
}

fn perform_dry_run(config: &RenamerConfig, request: &BatchRequest) {
    let preferred = request
        .preset
        .clone()
        .unwrap_or_else(|| config.default_preset.clone());
    println!("🔍 Dry run");
    println!("  Preferred preset: {}", preferred);
    if config.find_preset(&preferred).is_none() {
        println!("  ⚠️  Preset '{}' is not defined", preferred);
    }

    println!("  Documents ({}):", request.documents.len());
    for doc in &request.documents {
        let source = if is_raster_image(Path::new(&doc.file_name)) {
            "image"
        } else {
            "pdf"
        };
        println!("    • {} ({} bytes, {})", doc.file_name, doc.bytes.len(), source);
    }

    match &request.lookup {
        Some(lookup) => match MatchTable::from_bytes(&lookup.bytes, &config.matching.encodings) {
            Ok(table) => println!(
                "  Lookup: {} - {} suffixes ({})",
                lookup.file_name,
                table.len(),
                table.encoding().map(|e| e.label()).unwrap_or("unknown")
            ),
            Err(e) => println!("  ❌ Lookup: {}", e.user_friendly_message()),
        },
        None => println!("  ❌ Lookup: not given"),
    }
}

/// 記錄錯誤、寫出 system_error 檔，並依嚴重程度結束
fn exit_with(e: &RenamerError, system_error: Option<(&LocalStorage, &RenamerConfig)>) -> ! {
    tracing::error!(
        "❌ Batch failed: {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 建議: {}", e.recovery_suggestion());

    if let Some((storage, config)) = system_error {
        let text = format!(
            "System error: {}\n\nDetails: {}\nSuggestion: {}\n",
            e.user_friendly_message(),
            e,
            e.recovery_suggestion()
        );
        if let Err(write_err) = storage.write_file(&config.output.system_error_name, text.as_bytes()) {
            tracing::error!("Could not write system error report: {}", write_err);
        }
    }

    let exit_code = match e.severity() {
        ErrorSeverity::Low => 0,
        ErrorSeverity::Medium => 2,
        ErrorSeverity::High => 1,
        ErrorSeverity::Critical => 3,
    };
    std::process::exit(exit_code);
}
