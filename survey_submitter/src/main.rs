use std::{fs, process, sync::Arc};
use survey_submitter::{
    config,
    modules::survey_controller::MessageKind,
    FormContext, HttpTransport, RawForm, SubmissionCoordinator, SurveyController,
};

const DEFAULT_CONFIG_PATH: &str = "survey_submitter/Config.toml";

fn print_usage() {
    println!("Usage: survey_submitter [--config <path>] <answers.json>");
    println!();
    println!("  answers.json   JSON object of form field name to a string or list of strings");
    println!("  --config       Configuration file (default: {})", DEFAULT_CONFIG_PATH);
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();

    // Parse --config option
    let mut config_path = DEFAULT_CONFIG_PATH.to_string();
    let mut answers_path: Option<String> = None;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                i += 1;
                match args.get(i) {
                    Some(path) => config_path = path.clone(),
                    None => {
                        eprintln!("--config requires a value");
                        process::exit(2);
                    }
                }
            }
            "-h" | "--help" => {
                print_usage();
                return;
            }
            other => answers_path = Some(other.to_string()),
        }
        i += 1;
    }

    let answers_path = match answers_path {
        Some(path) => path,
        None => {
            print_usage();
            process::exit(2);
        }
    };

    // Load the endpoint and timeout settings from Config.toml
    let config = match config::load_config(&config_path) {
        Ok(config) => config,
        Err(e) => {
            log::error!("Error loading configuration from {}: {}", config_path, e);
            process::exit(2);
        }
    };

    if config.endpoint.configured_url().is_none() {
        log::warn!("Submission endpoint URL is not set in {}, submissions will fail", config_path);
    }

    // Read the answers to submit
    let raw: RawForm = match fs::read_to_string(&answers_path)
        .map_err(|e| e.to_string())
        .and_then(|contents| serde_json::from_str(&contents).map_err(|e| e.to_string()))
    {
        Ok(raw) => raw,
        Err(e) => {
            log::error!("Error reading answers from {}: {}", answers_path, e);
            process::exit(2);
        }
    };

    let context = match FormContext::survey() {
        Ok(context) => context,
        Err(e) => {
            log::error!("Error building survey form: {}", e);
            process::exit(2);
        }
    };

    let transport = match HttpTransport::new() {
        Ok(transport) => Arc::new(transport),
        Err(e) => {
            log::error!("Error creating HTTP client: {}", e);
            process::exit(2);
        }
    };

    let coordinator = SubmissionCoordinator::new(
        &config.endpoint,
        &config.submission,
        transport.clone(),
        transport,
    );
    let mut controller = SurveyController::new(context, coordinator);

    let result = controller.submit(&raw).await;

    for error in &controller.ui().field_errors {
        eprintln!("  {}: {}", error.field, error.message);
    }
    if let Some(message) = &controller.ui().message {
        match message.kind {
            MessageKind::Error => eprintln!("{}", message.text),
            MessageKind::Success | MessageKind::Qualified => println!("{}", message.text),
        }
    }

    match result {
        Some(result) if result.is_delivered() => {}
        _ => process::exit(1),
    }
}
