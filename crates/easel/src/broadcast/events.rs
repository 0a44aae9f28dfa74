//! Notification events for real-time streaming.
//!
//! Wire names match the socket events the web client listens for, so the
//! transport glue can serialize a `Notification` and emit it as-is.

use serde::{Deserialize, Serialize};

use crate::review::status::{PromptStatus, SafetyLevel};

/// Who an event is addressed to. The transport layer subscribes to the hub
/// and routes each notification to the matching connection(s).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "camelCase")]
pub enum Recipient {
    /// One specific student connection.
    Student(String),
    /// One specific teacher connection.
    Teacher(String),
    /// Every connected teacher.
    Teachers,
    /// Every connected client.
    Broadcast,
}

/// Prompt reference embedded in `imageGenerated`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptRef {
    pub id: String,
    pub content: String,
}

/// Student reference embedded in `imageGenerated`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRef {
    pub id: String,
    pub name: String,
    pub username: String,
}

/// Per-prompt outcome carried by `batchProcessingCompleted`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchPromptDetail {
    pub prompt_id: String,
    pub student_id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A state-transition event, named and shaped as on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum Event {
    #[serde(rename = "new_prompt_submitted", rename_all = "camelCase")]
    NewPromptSubmitted {
        prompt_id: String,
        student_id: String,
        student_name: String,
        content_preview: String,
    },

    #[serde(rename = "promptApproved", rename_all = "camelCase")]
    PromptApproved {
        prompt_id: String,
        student_id: String,
    },

    #[serde(rename = "promptRejected", rename_all = "camelCase")]
    PromptRejected {
        prompt_id: String,
        student_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        rejection_reason: Option<String>,
    },

    #[serde(rename = "promptProcessed", rename_all = "camelCase")]
    PromptProcessed {
        prompt_id: String,
        student_id: String,
        status: PromptStatus,
        message: String,
    },

    #[serde(rename = "imageGenerated", rename_all = "camelCase")]
    ImageGenerated {
        image_id: String,
        path: String,
        is_external_url: bool,
        prompt: PromptRef,
        student: StudentRef,
        safety_level: SafetyLevel,
        created_at: String,
    },

    #[serde(rename = "imageApproved", rename_all = "camelCase")]
    ImageApproved {
        image_id: String,
        student_id: String,
        image_url: String,
        prompt_id: String,
    },

    #[serde(rename = "imageRejected", rename_all = "camelCase")]
    ImageRejected {
        image_id: String,
        student_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        rejection_reason: Option<String>,
    },

    #[serde(rename = "batchProcessingCompleted", rename_all = "camelCase")]
    BatchProcessingCompleted {
        teacher_id: String,
        total_processed: usize,
        success_count: usize,
        error_count: usize,
        details: Vec<BatchPromptDetail>,
    },
}

/// An addressed event, as published on the hub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub recipient: Recipient,
    #[serde(flatten)]
    pub event: Event,
}
