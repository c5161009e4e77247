//! Descriptor similarity decisions.

use crate::types::{FaceDescriptor, FaceMatch, KnownSet, SubjectId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default acceptance threshold. Biased toward false rejections.
pub const DEFAULT_TOLERANCE: f32 = 0.75;

/// Cosine similarity of two descriptors, see [`FaceDescriptor::similarity`].
pub fn similarity(a: &FaceDescriptor, b: &FaceDescriptor) -> f32 {
    a.similarity(b)
}

/// `similarity(a, b) > tolerance`; incomparable descriptors never match.
pub fn matches(a: &FaceDescriptor, b: &FaceDescriptor, tolerance: f32) -> bool {
    a.is_comparable(b) && a.similarity(b) > tolerance
}

/// Result of comparing one probe against a known set.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MatchDecision {
    /// The accepted entry. `face_index` is left at 0 for the caller to fill.
    pub accepted: Option<FaceMatch>,
    /// Highest similarity among the comparable entries scanned, `None` if
    /// there were none.
    pub highest: Option<f32>,
}

impl MatchDecision {
    fn observe(&mut self, sim: f32) {
        if self.highest.map_or(true, |h| sim > h) {
            self.highest = Some(sim);
        }
    }
}

/// Strategy for comparing one probe descriptor against a known set.
pub trait Matcher {
    fn compare(&self, probe: &FaceDescriptor, known: &KnownSet, tolerance: f32) -> MatchDecision;
}

fn comparable(probe: &FaceDescriptor, subject: &SubjectId, descriptor: &FaceDescriptor) -> bool {
    let ok = probe.is_comparable(descriptor);
    if !ok {
        tracing::warn!(
            %subject,
            expected = probe.len(),
            actual = descriptor.len(),
            "skipping incomparable descriptor"
        );
    }
    ok
}

/// Accepts the first known entry, in set order, that clears the tolerance.
///
/// Scan order decides the winner when several entries clear it.
pub struct FirstMatch;

impl Matcher for FirstMatch {
    fn compare(&self, probe: &FaceDescriptor, known: &KnownSet, tolerance: f32) -> MatchDecision {
        let mut decision = MatchDecision::default();
        for (subject, descriptor) in known.iter() {
            if !comparable(probe, subject, descriptor) {
                continue;
            }
            let sim = probe.similarity(descriptor);
            tracing::trace!(%subject, similarity = sim, "compared");
            decision.observe(sim);
            if sim > tolerance {
                decision.accepted = Some(FaceMatch {
                    face_index: 0,
                    subject: subject.clone(),
                    similarity: sim,
                });
                break;
            }
        }
        decision
    }
}

/// Scans every known entry and accepts the most similar one if it clears
/// the tolerance.
///
/// Ties keep the earlier entry.
pub struct BestMatch;

impl Matcher for BestMatch {
    fn compare(&self, probe: &FaceDescriptor, known: &KnownSet, tolerance: f32) -> MatchDecision {
        let mut best: Option<(&SubjectId, f32)> = None;

        for (subject, descriptor) in known.iter() {
            if !comparable(probe, subject, descriptor) {
                continue;
            }
            let sim = probe.similarity(descriptor);
            tracing::trace!(%subject, similarity = sim, "compared");
            if best.map_or(true, |(_, b)| sim > b) {
                best = Some((subject, sim));
            }
        }

        let accepted = match best {
            Some((subject, sim)) if sim > tolerance => Some(FaceMatch {
                face_index: 0,
                subject: subject.clone(),
                similarity: sim,
            }),
            Some((subject, sim)) => {
                tracing::debug!(
                    %subject,
                    similarity = sim,
                    tolerance,
                    "best candidate below tolerance"
                );
                None
            }
            None => None,
        };
        MatchDecision {
            accepted,
            highest: best.map(|(_, sim)| sim),
        }
    }
}

/// Which [`Matcher`] the pipeline applies per face.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchPolicy {
    #[default]
    Best,
    First,
}

impl MatchPolicy {
    pub fn matcher(self) -> &'static dyn Matcher {
        match self {
            MatchPolicy::Best => &BestMatch,
            MatchPolicy::First => &FirstMatch,
        }
    }
}

impl fmt::Display for MatchPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchPolicy::Best => f.write_str("best"),
            MatchPolicy::First => f.write_str("first"),
        }
    }
}

impl FromStr for MatchPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "best" => Ok(MatchPolicy::Best),
            "first" => Ok(MatchPolicy::First),
            other => Err(format!("unknown match policy '{other}' (expected 'best' or 'first')")),
        }
    }
}
