use hfgen::{
    logger::{self, LogLevel, LoggerConfig},
    AspectRatio, CredentialStore, DirectoryGallery, FileCredentialStore, GenerationRequest,
    HuggingFaceClient, HuggingFaceConfig, LogSink, ModelId,
};
use std::env;

const USAGE: &str = "Usage:
  hfgen <prompt> [model] [count] [ratio]
  hfgen set-key <hf_...>";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let dotenv_loaded = dotenv::dotenv().is_ok();

    let level = env::var("HFGEN_LOG")
        .ok()
        .and_then(|name| LogLevel::parse(&name))
        .unwrap_or(LogLevel::Info);
    logger::init_with_config(LoggerConfig::default().with_level(level))?;

    if dotenv_loaded {
        log::info!("✅ .env file loaded");
    } else {
        log::debug!("No .env file found, using process environment");
    }

    let args: Vec<String> = env::args().skip(1).collect();
    if args.is_empty() {
        eprintln!("{}", USAGE);
        std::process::exit(2);
    }

    let config = HuggingFaceConfig::from_env();
    logger::log_config_info(&config);

    if args[0] == "set-key" {
        let key = args.get(1).ok_or(USAGE)?;
        let store = FileCredentialStore::open(&config.key_file)?;
        store.set(key.clone())?;
        log::info!("✅ API key saved to {}", store.path().display());
        if config.api_key.is_some() {
            log::warn!("💡 HF_API_KEY is set and takes precedence over the saved key");
        }
        return Ok(());
    }

    let client = HuggingFaceClient::new(config)?;

    log::info!("🖼️  Available image generation models:");
    for model in hfgen::supported_models() {
        log::info!("  {} - {} ({})", model.id, model.name, model.provider);
    }

    let prompt = args[0].clone();
    let model_id = args
        .get(1)
        .cloned()
        .unwrap_or_else(|| ModelId::StableDiffusionXl.to_string());
    let count = match args.get(2) {
        Some(raw) => raw.parse::<usize>()?,
        None => 1,
    };
    let aspect_ratio = match args.get(3) {
        Some(raw) => raw.parse::<AspectRatio>()?,
        None => AspectRatio::default(),
    };

    let output_dir = env::var("HFGEN_OUTPUT_DIR").unwrap_or_else(|_| "generated".to_string());
    let gallery = DirectoryGallery::new(&output_dir)?;
    let sink = (LogSink, gallery);

    let request = GenerationRequest::new(model_id, prompt, aspect_ratio, count);

    let _timer = logger::timer("Image batch");
    let report = match client.generate_batch(&request, &sink).await {
        Ok(report) => report,
        Err(e) => {
            log::error!("❌ {}", e);
            if matches!(e, hfgen::GenError::MissingCredential) {
                log::warn!("💡 Set HF_API_KEY or run `hfgen set-key <hf_...>` first");
            }
            return Err(e.into());
        }
    };

    log::info!("📝 Summary:");
    log::info!(
        "   {} of {} image(s) generated at {}x{}",
        report.success_count(),
        report.outcomes.len(),
        report.dimensions.width,
        report.dimensions.height
    );
    for path in sink.1.saved() {
        log::info!("   {}", path.display());
    }
    if client.credentials().get().is_none() {
        log::warn!("⚠️  The API key was rejected and has been cleared");
    }

    Ok(())
}
