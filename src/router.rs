//!
//! Backend classification.
//!
//! A model identifier carrying the `gemini:` prefix selects the cloud backend;
//! every other identifier, including an absent one, selects the local backend.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- constants ------------------------------------------------------------------------------ */

/** reserved tag that routes a model identifier to the cloud backend */
pub const CLOUD_MODEL_PREFIX: &str = "gemini:";

/* --- types ----------------------------------------------------------------------------------- */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Local,
    Cloud,
}

///
/// Where one request goes and under which names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub kind: BackendKind,
    /** identifier reported to the client in `meta` and non-streaming answers */
    pub display_model: String,
    /** model name sent to the backend */
    pub backend_model: String,
}

/* --- start of code -------------------------------------------------------------------------- */

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Local => "local",
            BackendKind::Cloud => "cloud",
        }
    }
}

///
/// Classify a request by its model identifier.
///
/// # Arguments
///  * `model` - identifier from the request, `None` when absent or empty
///  * `local_default` - model used for the local backend when none is named
///  * `cloud_default` - model used when the prefix is followed by nothing
///
/// # Returns
///  * the selected backend with display and backend model names
pub fn classify(model: Option<&str>, local_default: &str, cloud_default: &str) -> Route {
    let model = model.filter(|id| !id.is_empty());

    if let Some(stripped) = model.and_then(|id| id.strip_prefix(CLOUD_MODEL_PREFIX)) {
        let backend_model =
            if stripped.is_empty() { cloud_default.to_string() } else { stripped.to_string() };
        return Route {
            kind: BackendKind::Cloud,
            display_model: format!("{}{}", CLOUD_MODEL_PREFIX, backend_model),
            backend_model,
        };
    }

    let id = model.unwrap_or(local_default);
    Route { kind: BackendKind::Local, display_model: id.to_string(), backend_model: id.to_string() }
}
