use crate::config::{LOADING_MESSAGES, REQUEST_FAILURE_MESSAGE};
use crate::handlers::form::{FormError, FormState, SelectedImage};
use crate::llm::{AnalysisError, AnalysisRequest};

/// Outcome of the latest request. At most one side is ever set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestResult {
    narrative: Option<String>,
    error: Option<String>,
}

impl RequestResult {
    pub fn narrative(&self) -> Option<&str> {
        self.narrative.as_deref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn succeed(&mut self, narrative: String) {
        self.narrative = Some(narrative);
        self.error = None;
    }

    pub fn fail(&mut self, message: &str) {
        self.narrative = None;
        self.error = Some(message.to_string());
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    pub fn clear(&mut self) {
        self.narrative = None;
        self.error = None;
    }
}

/// Canonical session state. The view is always derived from this, never
/// stored alongside it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppState {
    pub form: FormState,
    pub result: RequestResult,
    in_flight: bool,
    loading_message: usize,
}

impl AppState {
    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn can_submit(&self) -> bool {
        self.form.has_encoded_image() && !self.in_flight
    }

    pub fn loading_message(&self) -> &'static str {
        LOADING_MESSAGES[self.loading_message % LOADING_MESSAGES.len()]
    }

    pub fn set_loading_message(&mut self, index: usize) {
        self.loading_message = index % LOADING_MESSAGES.len();
    }

    /// Applies the outcome of a file selection. A rejection also drops any
    /// previously accepted photo.
    pub fn apply_image_selection(&mut self, selection: Result<SelectedImage, FormError>) {
        match selection {
            Ok(image) => {
                self.form.image = Some(image);
                self.result.clear_error();
            }
            Err(err) => {
                self.form.clear_image();
                self.result.fail(&err.to_string());
            }
        }
    }

    /// Flips into the loading state and hands back the request to send.
    pub fn begin_request(&mut self) -> Result<AnalysisRequest, FormError> {
        if self.in_flight {
            return Err(FormError::RequestPending);
        }
        let Some(image) = self.form.image.as_ref().filter(|image| !image.encoded.is_empty())
        else {
            self.result.fail(&FormError::MissingImage.to_string());
            return Err(FormError::MissingImage);
        };

        let request = AnalysisRequest {
            mime_type: image.mime_type.clone(),
            encoded_image: image.encoded.clone(),
            name: self.form.name.clone(),
            age: self.form.age.clone(),
            traits: self.form.traits.clone(),
        };
        self.in_flight = true;
        self.loading_message = 0;
        self.result.clear();
        Ok(request)
    }

    /// Records a finished request. Returns `false` when nothing was in flight
    /// and the outcome was discarded.
    pub fn finish_request(&mut self, outcome: Result<String, AnalysisError>) -> bool {
        if !self.in_flight {
            return false;
        }
        self.in_flight = false;
        match outcome {
            Ok(narrative) => self.result.succeed(narrative),
            Err(_) => self.result.fail(REQUEST_FAILURE_MESSAGE),
        }
        true
    }

    pub fn reset(&mut self) {
        *self = AppState::default();
    }
}
