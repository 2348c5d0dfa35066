//! civic-board/crates/cb-core/src/lib.rs
//!
//! The central domain logic and interface definitions for the dashboard.

pub mod error;
pub mod main_page;
pub mod models;
pub mod schedule;
pub mod traits;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-exporting for easier access in other crates
pub use error::*;
pub use models::*;
pub use traits::*;

#[cfg(test)]
mod tests {
    use super::models::*;
    use std::str::FromStr;

    #[test]
    fn test_kind_round_trips_through_path_segment() {
        for kind in ContentKind::ALL {
            assert_eq!(ContentKind::from_str(kind.as_str()).unwrap(), kind);
        }
        assert!(ContentKind::from_str("newsletter").is_err());
    }

    #[test]
    fn test_password_hash_is_not_serialized() {
        let user = User {
            id: "u1".into(),
            email: "staff@example.org".into(),
            display_name: "Staff".into(),
            role: Role::Editor,
            password_hash: "$argon2id$secret".into(),
            created_at: chrono::Utc::now(),
        };
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["role"], "editor");
    }

    #[test]
    fn test_inquiry_validation() {
        let mut draft = InquiryDraft {
            name: "Ana".into(),
            email: "ana@example.org".into(),
            subject: String::new(),
            message: "Hello".into(),
        };
        assert!(draft.validate().is_ok());
        draft.email = "not-an-email".into();
        assert!(draft.validate().is_err());
    }

    #[test]
    fn test_conflict_survives_anyhow_boundary() {
        let err: crate::AppError = anyhow::Error::new(crate::AppError::Conflict("email taken".into())).into();
        assert!(matches!(err, crate::AppError::Conflict(_)));
    }
}
