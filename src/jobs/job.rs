//! Job - one run of a remote pipeline stage and its status.

use std::fmt;

use crate::service::Base64Image;

/// Which pipeline stage a job belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Harmonize,
    Animate,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobKind::Harmonize => write!(f, "harmonize"),
            JobKind::Animate => write!(f, "animate"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Idle,
    Submitted,
    Processing,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }

    pub fn is_pending(self) -> bool {
        matches!(self, JobStatus::Submitted | JobStatus::Processing)
    }
}

/// What a successful job produced.
#[derive(Debug, Clone, PartialEq)]
pub enum JobResult {
    Image(Base64Image),
    Video { url: String },
}

/// Human readable text for a raw provider status string.
pub fn format_status(status: &str) -> String {
    match status {
        "starting" => "Starting animation process...".to_string(),
        "processing" => "Processing your animation...".to_string(),
        "succeeded" => "Animation completed!".to_string(),
        "failed" => "Animation failed".to_string(),
        other => format!("Status: {}", other),
    }
}

/// State of one pipeline stage run.
///
/// Once terminal, a job is never changed again; the next run replaces it.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub kind: JobKind,
    pub status: JobStatus,
    pub result: Option<JobResult>,
    pub error_message: Option<String>,
    /// Provider-assigned token (the animation prediction id).
    pub external_id: Option<String>,
    /// Status line shown to the user.
    pub status_text: String,
}

impl Job {
    pub fn new(kind: JobKind) -> Self {
        Self {
            kind,
            status: JobStatus::Idle,
            result: None,
            error_message: None,
            external_id: None,
            status_text: String::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_pending(&self) -> bool {
        self.status.is_pending()
    }

    /// `idle -> submitted`.
    pub fn submit(&mut self, status_text: impl Into<String>) -> bool {
        if self.status != JobStatus::Idle {
            return false;
        }
        self.status = JobStatus::Submitted;
        self.status_text = status_text.into();
        true
    }

    /// `submitted|processing -> processing`, refreshing the status line.
    pub fn processing(&mut self, status_text: impl Into<String>) -> bool {
        if !self.is_pending() {
            return false;
        }
        self.status = JobStatus::Processing;
        self.status_text = status_text.into();
        true
    }

    pub fn succeed(&mut self, result: JobResult) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.status = JobStatus::Succeeded;
        self.result = Some(result);
        true
    }

    pub fn fail(&mut self, message: impl Into<String>) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.status = JobStatus::Failed;
        self.error_message = Some(message.into());
        true
    }
}
