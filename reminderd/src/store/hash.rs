use sha2::{Sha256, Digest};
use shared::types::Medication;

/// SHA-256 of the medication collection, in list order.
/// Clients compare it to decide whether to refetch the list.
pub fn compute_hash(medications: &[Medication]) -> String {
    let json = serde_json::to_string(medications)
        .expect("Failed to serialize medications for hashing");

    let hash = Sha256::digest(json.as_bytes());
    hex::encode(hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn medication(id: i64) -> Medication {
        Medication {
            medication_id: id,
            name: "Aspirin".to_string(),
            dosage: "100mg".to_string(),
            frequency: "00:00:00".to_string(),
            start_date: "25/12/2030".to_string(),
            start_time: "09:00".to_string(),
        }
    }

    #[test]
    fn test_hash_deterministic() {
        let meds = [medication(1), medication(2)];
        assert_eq!(compute_hash(&meds), compute_hash(&meds.clone()));
        assert_eq!(compute_hash(&meds).len(), 64);
    }

    #[test]
    fn test_hash_changes_on_modification() {
        let before = compute_hash(&[medication(1)]);

        let mut edited = medication(1);
        edited.start_time = "09:30".to_string();
        let after = compute_hash(&[edited]);

        assert_ne!(before, after, "Hash should change when a medication changes");
    }

    #[test]
    fn test_hash_tracks_list_order() {
        let a = compute_hash(&[medication(1), medication(2)]);
        let b = compute_hash(&[medication(2), medication(1)]);
        assert_ne!(a, b, "Reordering the list is a change");
    }
}
