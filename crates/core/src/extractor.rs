use crate::error::IngestError;
use base64::{engine::general_purpose::STANDARD, Engine};
use lopdf::Document;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const SUPPORTED_EXTENSIONS: [&str; 5] = ["pdf", "png", "jpg", "jpeg", "txt"];

#[derive(Debug, Clone)]
pub struct UnitText {
    pub unit: u32,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct OcrEndpointConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
struct OcrRequest {
    image_base64: String,
    source_path: String,
}

#[derive(Debug, Clone, Deserialize)]
struct OcrResponse {
    text: Option<String>,
}

pub trait TextExtractor {
    fn extract_units(&self, path: &Path) -> Result<Vec<UnitText>, IngestError>;
}

#[derive(Default)]
pub struct LopdfExtractor;

impl TextExtractor for LopdfExtractor {
    fn extract_units(&self, path: &Path) -> Result<Vec<UnitText>, IngestError> {
        let document =
            Document::load(path).map_err(|error| IngestError::PdfParse(error.to_string()))?;

        let mut units = Vec::new();
        for (page_no, _page_id) in document.get_pages() {
            // A page that yields no text is skipped, never a file-level fault.
            let text = match document.extract_text(&[page_no]) {
                Ok(text) => text,
                Err(_) => continue,
            };

            if !text.trim().is_empty() {
                units.push(UnitText {
                    unit: page_no,
                    text,
                });
            }
        }

        Ok(units)
    }
}

pub fn file_extension(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default()
}

pub fn is_supported_file(path: &Path) -> bool {
    let extension = file_extension(path);
    SUPPORTED_EXTENSIONS
        .iter()
        .any(|supported| *supported == extension)
}

pub fn extract_file_units(path: &Path) -> Result<Vec<UnitText>, IngestError> {
    match file_extension(path).as_str() {
        "pdf" => LopdfExtractor::default().extract_units(path),
        "png" | "jpg" | "jpeg" => extract_image_units(path),
        "txt" => extract_text_units(path),
        other => Err(IngestError::UnsupportedFormat(format!(
            ".{other} for {}",
            path.display()
        ))),
    }
}

fn extract_text_units(path: &Path) -> Result<Vec<UnitText>, IngestError> {
    let text = std::fs::read_to_string(path)?;
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    Ok(vec![UnitText { unit: 1, text }])
}

fn extract_image_units(path: &Path) -> Result<Vec<UnitText>, IngestError> {
    let text = tokio::task::block_in_place(|| ocr_image_blocking(path))?;
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    Ok(vec![UnitText { unit: 1, text }])
}

fn parse_ocr_config() -> Option<OcrEndpointConfig> {
    let endpoint = std::env::var("NOTES_OCR_ENDPOINT").ok()?;
    let endpoint = endpoint.trim().to_string();
    if endpoint.is_empty() {
        return None;
    }

    let api_key = std::env::var("NOTES_OCR_API_KEY").ok().and_then(|value| {
        let key = value.trim().to_string();
        if key.is_empty() {
            None
        } else {
            Some(key)
        }
    });

    Some(OcrEndpointConfig { endpoint, api_key })
}

fn ocr_image_blocking(path: &Path) -> Result<String, IngestError> {
    let cfg = parse_ocr_config().ok_or_else(|| {
        IngestError::OcrFailed(format!(
            "no OCR endpoint configured, cannot read {}",
            path.display()
        ))
    })?;

    let image = std::fs::read(path).map_err(IngestError::Io)?;
    let payload = OcrRequest {
        image_base64: STANDARD.encode(image),
        source_path: path.to_string_lossy().to_string(),
    };

    let mut request = Client::new()
        .post(&cfg.endpoint)
        .header("content-type", "application/json")
        .json(&payload);

    if let Some(api_key) = cfg.api_key {
        request = request.bearer_auth(api_key);
    }

    let response = request.send()?;

    if !response.status().is_success() {
        return Err(IngestError::OcrFailed(format!(
            "OCR request to {} returned {}",
            cfg.endpoint,
            response.status()
        )));
    }

    let payload: OcrResponse = response.json()?;
    Ok(payload.text.unwrap_or_default())
}
