//! Non-fatal diagnostics collected during an import or export run.
//!
//! Data-quality problems in authored content are expected; they are
//! handled with a documented fallback and surfaced here so the host can
//! show them to the user, rather than aborting the run.

/// A single non-fatal finding, carrying enough identifiers to locate the
/// offending data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// Two skins disagreed about a bone's bind pose beyond tolerance; the
    /// named mesh's vertices and normals were corrected to match the
    /// authoritative skin.
    ReconciliationDivergence {
        /// The mesh whose vertex data was corrected.
        mesh: String,
        /// The bone the skins disagreed about.
        bone: String,
    },

    /// A keyframe channel used an interpolation kind the scene side cannot
    /// represent; a lossy fallback was applied.
    UnsupportedInterpolation {
        /// The affected channel (controller target and property).
        channel: String,
        /// The raw interpolation kind from the record.
        kind: u32,
    },

    /// A controller's cycle flags did not decode to a supported
    /// extrapolation mode; clamped extrapolation was used.
    UnsupportedExtrapolation {
        /// The affected channel.
        channel: String,
    },

    /// An animated channel referenced a bone absent from the skeleton and
    /// was skipped (import only; on export this is fatal).
    MissingBone {
        /// The affected channel.
        channel: String,
        /// The bone name that did not resolve.
        bone: String,
    },

    /// A bone had neither a skin reference nor a pose sample; it received
    /// an identity bind pose.
    UnboundBone {
        /// The affected bone.
        bone: String,
    },

    /// Parallel F-curves of one property disagreed on key count; the
    /// channel was truncated to the shortest curve.
    MisalignedKeys {
        /// The affected channel (action, bone and property).
        channel: String,
    },
}

/// Collected warnings for one bridge run.
#[derive(Debug, Clone, Default)]
pub struct Report {
    warnings: Vec<Warning>,
}

impl Report {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a warning and mirror it to the log.
    pub fn push(&mut self, warning: Warning) {
        match &warning {
            Warning::ReconciliationDivergence { mesh, bone } => {
                tracing::warn!("bind pose of bone '{bone}' diverged; corrected vertices of '{mesh}'");
            }
            Warning::UnsupportedInterpolation { channel, kind } => {
                tracing::warn!("unsupported interpolation ({kind}) on '{channel}', using constant");
            }
            Warning::UnsupportedExtrapolation { channel } => {
                tracing::warn!("unsupported cycle mode on '{channel}', using clamped");
            }
            Warning::MissingBone { channel, bone } => {
                tracing::warn!("channel '{channel}' targets unknown bone '{bone}', skipped");
            }
            Warning::UnboundBone { bone } => {
                tracing::warn!("bone '{bone}' has no skin reference or pose sample, using identity bind");
            }
            Warning::MisalignedKeys { channel } => {
                tracing::warn!("curves of '{channel}' disagree on key count, truncated to shortest");
            }
        }
        self.warnings.push(warning);
    }

    #[must_use]
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }

    /// Count warnings of the reconciliation-divergence kind.
    #[must_use]
    pub fn divergence_count(&self) -> usize {
        self.warnings
            .iter()
            .filter(|w| matches!(w, Warning::ReconciliationDivergence { .. }))
            .count()
    }
}
