//! Client consultation history records.

use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use caresync_common::{AccountId, Error, RecordId, Result};

use crate::record::SyncRecord;

/// Maximum number of attachment references per history item.
pub const MAX_ATTACHMENTS: usize = 10;

/// How a consultation was held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConsultationKind {
    InPerson,
    Online,
    PhoneCall,
    Other,
}

impl Default for ConsultationKind {
    fn default() -> Self {
        Self::Other
    }
}

/// One entry in a provider's client history, synced between device and backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientHistoryItem {
    /// Stable record identifier.
    pub id: RecordId,
    /// Provider the history entry belongs to.
    pub provider_id: AccountId,
    /// Patient seen in this consultation.
    pub patient_id: String,
    /// Display name of the patient at the time of the consultation.
    pub patient_name: String,
    /// Day the consultation took place.
    pub consultation_date: NaiveDate,
    /// Consultation channel.
    #[serde(default)]
    pub kind: ConsultationKind,
    /// Free-form notes.
    #[serde(default)]
    pub notes: String,
    /// References to attached documents.
    #[serde(default)]
    pub attachments: Vec<String>,
    /// Local sync state; never serialized.
    #[serde(skip_serializing, default)]
    pub synced: bool,
}

impl ClientHistoryItem {
    /// Create a new locally authored history item (unsynced).
    pub fn new(
        provider_id: AccountId,
        patient_id: impl Into<String>,
        patient_name: impl Into<String>,
        consultation_date: NaiveDate,
        kind: ConsultationKind,
    ) -> Self {
        Self {
            id: RecordId::generate(),
            provider_id,
            patient_id: patient_id.into(),
            patient_name: patient_name.into(),
            consultation_date,
            kind,
            notes: String::new(),
            attachments: Vec::new(),
            synced: false,
        }
    }
}

impl SyncRecord for ClientHistoryItem {
    const COLLECTION: &'static str = "client_history";
    const TABLE: &'static str = "client_history_item";
    const OWNER_FIELD: &'static str = "providerId";

    fn id(&self) -> &RecordId {
        &self.id
    }

    fn owner(&self) -> &AccountId {
        &self.provider_id
    }

    fn synced(&self) -> bool {
        self.synced
    }

    fn set_synced(&mut self, synced: bool) {
        self.synced = synced;
    }

    fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if self.id.as_str().is_empty() {
            errors.push("id is required".to_string());
        }
        if self.provider_id.as_str().is_empty() {
            errors.push("provider id is required".to_string());
        }
        if self.patient_id.is_empty() {
            errors.push("patient id is required".to_string());
        }
        if self.patient_name.is_empty() {
            errors.push("patient name is required".to_string());
        }

        let oldest = Utc::now().date_naive() - Duration::days(365 * 100);
        if self.consultation_date < oldest {
            errors.push("consultation date is too old".to_string());
        }

        if self.attachments.len() > MAX_ATTACHMENTS {
            errors.push(format!("maximum {} attachments allowed", MAX_ATTACHMENTS));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::InvalidRecord(errors.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample() -> ClientHistoryItem {
        ClientHistoryItem::new(
            AccountId::new("provider-1").unwrap(),
            "patient-9",
            "Jane Doe",
            NaiveDate::from_ymd_opt(2024, 2, 14).unwrap(),
            ConsultationKind::Online,
        )
    }

    #[test]
    fn test_validate_ok() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_patient() {
        let mut item = sample();
        item.patient_id = String::new();
        item.patient_name = String::new();
        let msg = item.validate().unwrap_err().to_string();
        assert!(msg.contains("patient id is required"));
        assert!(msg.contains("patient name is required"));
    }

    #[test]
    fn test_validate_rejects_too_many_attachments() {
        let mut item = sample();
        item.attachments = (0..=MAX_ATTACHMENTS).map(|i| format!("file-{}.pdf", i)).collect();
        assert!(item.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_ancient_date() {
        let mut item = sample();
        item.consultation_date = NaiveDate::from_ymd_opt(1850, 1, 1).unwrap();
        assert!(item.validate().is_err());
    }

    #[test]
    fn test_wire_shape() {
        let item = sample();
        let value = serde_json::to_value(&item).unwrap();
        assert_eq!(value["providerId"], "provider-1");
        assert_eq!(value["consultationDate"], "2024-02-14");
        assert_eq!(value["kind"], "ONLINE");
        assert!(value.get("synced").is_none());
    }

    proptest! {
        /// Any item that serializes must deserialize back to equal content
        /// (modulo the local-only synced flag, which round-trips to false).
        #[test]
        fn prop_serde_round_trip(
            patient_id in "[a-z0-9-]{1,32}",
            patient_name in ".{1,64}",
            notes in ".{0,200}",
            attachments in proptest::collection::vec("[a-z]{1,12}\\.pdf", 0..10),
        ) {
            let mut item = sample();
            item.patient_id = patient_id;
            item.patient_name = patient_name;
            item.notes = notes;
            item.attachments = attachments;
            item.synced = true;

            let json = serde_json::to_string(&item).unwrap();
            let back: ClientHistoryItem = serde_json::from_str(&json).unwrap();

            prop_assert!(!back.synced);
            let mut expected = item.clone();
            expected.synced = false;
            prop_assert_eq!(back, expected);
        }
    }
}
