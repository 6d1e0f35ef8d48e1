//! The per-frame attendance step, free of camera, display and clock.

use crate::gallery::Gallery;
use crate::roster::Roster;
use crate::types::{AttendanceRecord, DetectedFace, Matcher};
use chrono::NaiveTime;

/// What one frame changed.
#[derive(Debug, Clone)]
pub struct FrameOutcome {
    /// Roster after this frame.
    pub roster: Roster,
    /// New records, in detection order.
    pub records: Vec<AttendanceRecord>,
    /// Name assigned to each face (same order as the input), if any.
    pub labels: Vec<Option<String>>,
}

/// Match every face in a frame and mark first sightings present.
///
/// Faces are matched independently. A name is recorded only while it is
/// still pending, so showing the same person again (in this frame or a
/// later one) never adds a second record. Unrecognised faces are skipped.
pub fn attend<M: Matcher + ?Sized>(
    faces: &[DetectedFace],
    gallery: &Gallery,
    matcher: &M,
    roster: &Roster,
    at: NaiveTime,
) -> FrameOutcome {
    let mut roster = roster.clone();
    let mut records = Vec::new();
    let mut labels = Vec::with_capacity(faces.len());

    for face in faces {
        let result = matcher.compare(&face.embedding, gallery.identities());
        tracing::trace!(
            matched = result.matched,
            distance = result.distance,
            index = ?result.index,
            "face compared"
        );

        if let Some(name) = result.name.as_deref() {
            if roster.mark_present(name) {
                records.push(AttendanceRecord {
                    name: name.to_owned(),
                    time: at,
                });
            }
        }
        labels.push(result.name);
    }

    FrameOutcome {
        roster,
        records,
        labels,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BoundingBox, Embedding, EuclideanMatcher, KnownIdentity};

    const NAMES: [&str; 4] = ["MonaLisa", "Sachin", "Ratan Tata", "Tesla"];

    /// Known identities sit at 0.5 along their own axis; a fifth axis is
    /// left free to place probes at exact distances.
    fn gallery() -> Gallery {
        Gallery::from_identities(
            NAMES
                .iter()
                .enumerate()
                .map(|(i, name)| {
                    let mut v = vec![0.0; 5];
                    v[i] = 0.5;
                    KnownIdentity {
                        name: name.to_string(),
                        embedding: Embedding::new(v),
                    }
                })
                .collect(),
        )
        .unwrap()
    }

    fn near(identity: usize, distance: f32) -> DetectedFace {
        let mut v = vec![0.0; 5];
        v[identity] = 0.5;
        v[4] = distance;
        face(v)
    }

    fn face(values: Vec<f32>) -> DetectedFace {
        DetectedFace {
            bbox: BoundingBox {
                x: 0.0,
                y: 0.0,
                width: 10.0,
                height: 10.0,
                confidence: 0.9,
                landmarks: None,
            },
            embedding: Embedding::new(values),
        }
    }

    fn noon() -> NaiveTime {
        NaiveTime::from_hms_opt(12, 0, 0).unwrap()
    }

    #[test]
    fn test_first_sighting_recorded() {
        let gallery = gallery();
        let roster = Roster::from_gallery(&gallery);
        let out = attend(&[near(1, 0.02)], &gallery, &EuclideanMatcher::default(), &roster, noon());

        assert_eq!(
            out.records,
            vec![AttendanceRecord {
                name: "Sachin".into(),
                time: noon()
            }]
        );
        assert!(!out.roster.contains("Sachin"));
        assert_eq!(out.roster.len(), 3);
        assert_eq!(out.labels, vec![Some("Sachin".to_string())]);
        // Input roster is untouched.
        assert_eq!(roster.len(), 4);
    }

    #[test]
    fn test_repeat_sighting_is_noop() {
        let gallery = gallery();
        let matcher = EuclideanMatcher::default();
        let roster = Roster::from_gallery(&gallery);

        let first = attend(&[near(1, 0.02)], &gallery, &matcher, &roster, noon());
        let second = attend(&[near(1, 0.02)], &gallery, &matcher, &first.roster, noon());

        assert!(second.records.is_empty());
        assert_eq!(second.roster, first.roster);
        assert_eq!(second.labels, vec![Some("Sachin".to_string())]);
    }

    #[test]
    fn test_far_face_ignored() {
        let gallery = gallery();
        let roster = Roster::from_gallery(&gallery);
        // 0.5 on every known axis would be too close; sit on the free axis
        // so that every identity is exactly 0.9 away.
        let t = (0.81f32 - 0.25).sqrt();
        let probe = face(vec![0.0, 0.0, 0.0, 0.0, t]);
        for known in gallery.identities() {
            assert!((known.embedding.euclidean_distance(&probe.embedding) - 0.9).abs() < 1e-5);
        }

        let out = attend(&[probe], &gallery, &EuclideanMatcher::default(), &roster, noon());
        assert!(out.records.is_empty());
        assert_eq!(out.roster.len(), 4);
        assert_eq!(out.labels, vec![None]);
    }

    #[test]
    fn test_two_faces_one_frame_in_detection_order() {
        let gallery = gallery();
        let roster = Roster::from_gallery(&gallery);
        let faces = [near(0, 0.1), near(3, 0.3)];

        let out = attend(&faces, &gallery, &EuclideanMatcher::default(), &roster, noon());
        let names: Vec<_> = out.records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["MonaLisa", "Tesla"]);
        assert!(out.records.iter().all(|r| r.time == noon()));
        assert_eq!(out.roster.names(), &["Sachin".to_string(), "Ratan Tata".to_string()]);
    }

    #[test]
    fn test_same_person_twice_in_one_frame() {
        let gallery = gallery();
        let roster = Roster::from_gallery(&gallery);
        let faces = [near(2, 0.05), near(2, 0.1)];

        let out = attend(&faces, &gallery, &EuclideanMatcher::default(), &roster, noon());
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.labels.len(), 2);
    }

    #[test]
    fn test_match_test_disagreement_fails_closed() {
        let gallery = gallery();
        let roster = Roster::from_gallery(&gallery);
        let matcher = EuclideanMatcher {
            threshold: 0.6,
            tolerance: 0.4,
        };

        let out = attend(&[near(1, 0.5)], &gallery, &matcher, &roster, noon());
        assert!(out.records.is_empty());
        assert_eq!(out.labels, vec![None]);
        assert!(out.roster.contains("Sachin"));
    }

    #[test]
    fn test_custom_matcher_veto() {
        struct Sceptic;
        impl Matcher for Sceptic {
            fn distance(&self, a: &Embedding, b: &Embedding) -> f32 {
                a.euclidean_distance(b)
            }
            fn threshold(&self) -> f32 {
                0.6
            }
            fn tolerance(&self) -> f32 {
                0.6
            }
            fn matches(&self, gallery: &[KnownIdentity], _: &Embedding) -> Vec<bool> {
                vec![false; gallery.len()]
            }
        }

        let gallery = gallery();
        let roster = Roster::from_gallery(&gallery);
        let out = attend(&[near(1, 0.0)], &gallery, &Sceptic, &roster, noon());
        assert!(out.records.is_empty());
    }

    #[test]
    fn test_no_faces() {
        let gallery = gallery();
        let roster = Roster::from_gallery(&gallery);
        let out = attend(&[], &gallery, &EuclideanMatcher::default(), &roster, noon());
        assert!(out.records.is_empty());
        assert!(out.labels.is_empty());
        assert_eq!(out.roster, roster);
    }
}
