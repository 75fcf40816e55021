use std::process::ExitCode;

use chat_ocr::ChatOcrBuilder;
use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter};

const DEFAULT_INPUT_DIR: &str = "input_dir";

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_span_events(FmtSpan::CLOSE)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let input_dir = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_INPUT_DIR.to_string());

    let ocr = match ChatOcrBuilder::new()
        .lang("ch")
        .output_dir("OCR_output")
        .build()
    {
        Ok(ocr) => ocr,
        Err(err) => {
            log::error!("Failed to set up OCR: {err}");
            return ExitCode::FAILURE;
        }
    };

    let conversation = ocr.process_images(&input_dir, true);
    println!("{conversation}");
    ExitCode::SUCCESS
}
