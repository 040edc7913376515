//! Core data types: profiles, image records, and query results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An owner of image records, addressed by its unique name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Profile {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// A stored image with its fingerprints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageRecord {
    pub id: i64,

    /// Owning profile
    pub profile_id: i64,

    /// Blob store key of the uploaded bytes
    pub storage_key: String,

    /// Client-supplied file name, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,

    /// Perceptual hash (lowercase hex, fixed length)
    pub hash: Option<String>,

    /// Feature vector; `None` makes the record reachable by hash only.
    /// Never serialized: it is large and only meaningful to the store.
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,

    pub created_at: DateTime<Utc>,
}

/// Everything needed to insert an image record.
#[derive(Debug, Clone)]
pub struct NewImageRecord {
    pub profile_id: i64,
    pub storage_key: String,
    pub file_name: Option<String>,
    pub hash: Option<String>,
    pub embedding: Option<Vec<f32>>,
}

/// One row of a distance query: `score = 1 - cosine_distance`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoredImage {
    pub image_id: i64,
    pub profile_id: i64,
    pub score: f32,
}

/// One row of a perceptual hash lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashMatch {
    pub image_id: i64,
    pub profile_id: i64,
    pub hash: String,
    pub distance: u32,
}

/// What to do with a profile's images when the profile is deleted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeletePolicy {
    /// Refuse to delete a profile that still owns images
    #[default]
    Reject,
    /// Delete the profile's images along with it
    Cascade,
}

/// Sort scored rows by score descending, ties by image id ascending.
pub fn sort_scored(rows: &mut [ScoredImage]) {
    rows.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.image_id.cmp(&b.image_id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored(image_id: i64, score: f32) -> ScoredImage {
        ScoredImage {
            image_id,
            profile_id: 1,
            score,
        }
    }

    #[test]
    fn test_sort_scored_descending_with_id_ties() {
        let mut rows = vec![scored(3, 0.5), scored(1, 0.9), scored(2, 0.5), scored(4, -0.2)];
        sort_scored(&mut rows);
        let ids: Vec<i64> = rows.iter().map(|r| r.image_id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_delete_policy_default_rejects() {
        assert_eq!(DeletePolicy::default(), DeletePolicy::Reject);
        let policy: DeletePolicy = serde_json::from_str("\"cascade\"").unwrap();
        assert_eq!(policy, DeletePolicy::Cascade);
    }

    #[test]
    fn test_image_record_never_serializes_embedding() {
        let record = ImageRecord {
            id: 7,
            profile_id: 1,
            storage_key: "abc.png".to_string(),
            file_name: None,
            hash: Some("00ff00ff00ff00ff".to_string()),
            embedding: Some(vec![0.1; 4]),
            created_at: Utc::now(),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("embedding").is_none());
        assert!(json.get("file_name").is_none());
        assert_eq!(json["hash"], "00ff00ff00ff00ff");
    }
}
