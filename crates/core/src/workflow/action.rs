//! Actions an actor can take on the current step.
//!
//! Requests arrive as [`ActionRequest`] (loosely shaped, straight from the
//! wire) and are validated into an [`ApprovalAction`], the typed record that
//! ends up in the approval log.

use base64::Engine as _;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::CoreError;

/// Maximum accepted signature payload size (decoded).
pub const MAX_SIGNATURE_BYTES: usize = 2 * 1024 * 1024;

/// Content type recorded for signatures submitted without one.
pub const DEFAULT_SIGNATURE_CONTENT_TYPE: &str = "application/octet-stream";

/// Maximum length of a comment attached to an action.
pub const MAX_COMMENT_LENGTH: usize = 5000;

/// The verb applied to a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Approved,
    Rejected,
    Returned,
    Signed,
}

pub const VALID_ACTION_KINDS: &[&str] = &["approved", "rejected", "returned", "signed"];

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Returned => "returned",
            Self::Signed => "signed",
        }
    }

    pub fn from_str_value(s: &str) -> Result<Self, CoreError> {
        match s {
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "returned" => Ok(Self::Returned),
            "signed" => Ok(Self::Signed),
            _ => Err(CoreError::Validation(format!(
                "Invalid action '{s}'. Must be one of: {}",
                VALID_ACTION_KINDS.join(", ")
            ))),
        }
    }
}

/// Opaque signature bytes tagged with their content type.
///
/// The engine never interprets the bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignaturePayload {
    pub content_type: String,
    pub data: Vec<u8>,
}

impl SignaturePayload {
    /// Decode a base64 payload received over JSON.
    pub fn from_base64(content_type: &str, encoded: &str) -> Result<Self, CoreError> {
        let data = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| CoreError::Validation(format!("signature_data is not valid base64: {e}")))?;
        Ok(Self {
            content_type: content_type.trim().to_string(),
            data,
        })
    }

    /// Hex-encoded SHA-256 digest, stored alongside the bytes as evidence.
    pub fn sha256_hex(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.data);
        format!("{:x}", hasher.finalize())
    }

    /// Check the payload is usable evidence. A missing content type is
    /// tagged as [`DEFAULT_SIGNATURE_CONTENT_TYPE`].
    fn validated(mut self) -> Result<Self, CoreError> {
        if self.data.is_empty() {
            return Err(CoreError::Validation(
                "A signature is required for the signed action".into(),
            ));
        }
        if self.data.len() > MAX_SIGNATURE_BYTES {
            return Err(CoreError::Validation(format!(
                "signature exceeds {MAX_SIGNATURE_BYTES} bytes"
            )));
        }
        if self.content_type.trim().is_empty() {
            self.content_type = DEFAULT_SIGNATURE_CONTENT_TYPE.to_string();
        }
        Ok(self)
    }
}

/// An unvalidated action request.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionRequest {
    pub kind: ActionKind,
    pub comments: Option<String>,
    pub signature: Option<SignaturePayload>,
}

impl ActionRequest {
    pub fn new(kind: ActionKind) -> Self {
        Self {
            kind,
            comments: None,
            signature: None,
        }
    }

    pub fn with_comments(mut self, comments: impl Into<String>) -> Self {
        self.comments = Some(comments.into());
        self
    }

    pub fn with_signature(mut self, signature: SignaturePayload) -> Self {
        self.signature = Some(signature);
        self
    }

    /// Validate the payload for its kind.
    ///
    /// `signed` needs a non-empty signature; `returned` needs a comment
    /// explaining what to revise. Signatures sent with other kinds are
    /// dropped.
    pub fn validate(&self) -> Result<ApprovalAction, CoreError> {
        let comments = self
            .comments
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string);

        if let Some(c) = &comments {
            if c.chars().count() > MAX_COMMENT_LENGTH {
                return Err(CoreError::Validation(format!(
                    "comments must be at most {MAX_COMMENT_LENGTH} characters"
                )));
            }
        }

        match self.kind {
            ActionKind::Approved => Ok(ApprovalAction::Approved { comments }),
            ActionKind::Rejected => Ok(ApprovalAction::Rejected { comments }),
            ActionKind::Returned => {
                let comments = comments.ok_or_else(|| {
                    CoreError::Validation(
                        "Returning a workflow for revision requires comments".into(),
                    )
                })?;
                Ok(ApprovalAction::Returned { comments })
            }
            ActionKind::Signed => {
                let signature = self.signature.clone().ok_or_else(|| {
                    CoreError::Validation("A signature is required for the signed action".into())
                })?;
                Ok(ApprovalAction::Signed {
                    comments,
                    signature: signature.validated()?,
                })
            }
        }
    }
}

/// A validated action, one variant per kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalAction {
    Approved { comments: Option<String> },
    Rejected { comments: Option<String> },
    Returned { comments: String },
    Signed {
        comments: Option<String>,
        signature: SignaturePayload,
    },
}

impl ApprovalAction {
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::Approved { .. } => ActionKind::Approved,
            Self::Rejected { .. } => ActionKind::Rejected,
            Self::Returned { .. } => ActionKind::Returned,
            Self::Signed { .. } => ActionKind::Signed,
        }
    }

    pub fn comments(&self) -> Option<&str> {
        match self {
            Self::Approved { comments }
            | Self::Rejected { comments }
            | Self::Signed { comments, .. } => comments.as_deref(),
            Self::Returned { comments } => Some(comments),
        }
    }

    pub fn signature(&self) -> Option<&SignaturePayload> {
        match self {
            Self::Signed { signature, .. } => Some(signature),
            _ => None,
        }
    }
}
