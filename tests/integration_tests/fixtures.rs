//! Test fixtures for integration tests
//!
//! Sample API payloads in the shapes the HTTP adapter accepts

/// Plenary documents wrapped in a `data` envelope
pub const PLENARY_DOCUMENTS_JSON: &str = r#"{
  "data": [
    {
      "identifier": "TA-9-2024-0101",
      "label": "Markets in crypto-assets",
      "content": "New Blockchain regulation mentions bitcoin twice: bitcoin and BITCOIN.",
      "date": "2024-03-01",
      "url": "https://example.europa.eu/doc/TA-9-2024-0101"
    },
    {
      "identifier": "TA-9-2024-0102",
      "label": "Fisheries agreement",
      "content": "Quotas for the Baltic Sea.",
      "date": "2024-03-01T09:30:00Z"
    }
  ]
}"#;

/// A bare array repeating the first document of [`PLENARY_DOCUMENTS_JSON`]
pub const REPEATED_DOCUMENT_JSON: &str = r#"[
  {
    "id": "TA-9-2024-0101",
    "title": "Markets in crypto-assets",
    "body": "New Blockchain regulation mentions bitcoin twice: bitcoin and BITCOIN."
  },
  {
    "id": "TA-9-2024-0103",
    "title": "Bitcoin mining and energy",
    "body": "Energy use of bitcoin mining."
  }
]"#;

/// Payload with an entry missing its identifier
pub const MISSING_ID_JSON: &str = r#"[{"title": "No id", "body": "bitcoin"}]"#;

/// Keywords used throughout the integration tests
pub const WATCHED: &[&str] = &["blockchain", "bitcoin"];
