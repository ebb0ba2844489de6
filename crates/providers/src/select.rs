//! Deterministic provider selection and ranking.

use serde::Serialize;
use slipway_core::{Budget, DetectionResult, Environment, ProjectType, ProviderKind};

use crate::registry::ProviderRegistry;

/// Everything selection looks at besides the detection result.
#[derive(Debug, Clone)]
pub struct SelectionPolicy {
    /// Target environment (carried through to adapters; selection
    /// itself does not branch on it).
    pub environment: Environment,
    /// Cost policy.
    pub budget: Budget,
    /// Ordered provider preferences; may be empty.
    pub preferred: Vec<ProviderKind>,
    /// Skip selection entirely when set and registered.
    pub explicit: Option<ProviderKind>,
}

/// Choose one provider. Total and deterministic.
///
/// Decision order: explicit override, first registered preference,
/// Next.js goes to Vercel, static content goes to Netlify, everything
/// else goes to Vercel.
#[must_use]
pub fn choose(
    detection: &DetectionResult,
    policy: &SelectionPolicy,
    registry: &ProviderRegistry,
) -> ProviderKind {
    if let Some(explicit) = policy.explicit {
        if registry.contains(explicit) {
            return explicit;
        }
    }
    if let Some(preferred) = policy
        .preferred
        .iter()
        .copied()
        .find(|kind| registry.contains(*kind))
    {
        return preferred;
    }
    if detection.framework.contains("Next") {
        return ProviderKind::Vercel;
    }
    if detection.is_pure_static || detection.project_type == ProjectType::Static {
        return ProviderKind::Netlify;
    }
    ProviderKind::Vercel
}

/// One ranked entry from [`recommend`].
#[derive(Debug, Clone, Serialize)]
pub struct Recommendation {
    /// The scored provider.
    pub provider: ProviderKind,
    /// Additive score, clamped to 0..=100.
    pub score: u8,
    /// Human-readable scoring reasons.
    pub reasons: Vec<String>,
}

/// Score every registered adapter for a detection result.
///
/// Additive: +40 compatibility, +30 free tier when the budget prefers
/// one, +/-20 artifact-size fit, +15 framework affinity. Ties keep
/// registration order.
#[must_use]
pub fn recommend(
    detection: &DetectionResult,
    budget: Budget,
    registry: &ProviderRegistry,
) -> Vec<Recommendation> {
    let mut ranked: Vec<Recommendation> = registry
        .adapters()
        .iter()
        .map(|adapter| {
            let capabilities = adapter.capabilities();
            let mut score: i32 = 0;
            let mut reasons = Vec::new();

            if capabilities
                .supported_project_types
                .contains(&detection.project_type)
            {
                score += 40;
                reasons.push(format!("supports {} projects", detection.project_type));
            }
            if budget.prefers_free_tier() && capabilities.supports_free_tier {
                score += 30;
                reasons.push("free tier available".to_owned());
            }
            if detection.estimated_size_mb <= capabilities.max_artifact_mb {
                score += 20;
                reasons.push(format!(
                    "{:.1} MB fits the {:.0} MB limit",
                    detection.estimated_size_mb, capabilities.max_artifact_mb
                ));
            } else {
                score -= 20;
                reasons.push(format!(
                    "{:.1} MB exceeds the {:.0} MB limit",
                    detection.estimated_size_mb, capabilities.max_artifact_mb
                ));
            }
            if framework_affinity(adapter.kind(), detection) {
                score += 15;
                reasons.push(format!("good fit for {}", detection.framework));
            }

            Recommendation {
                provider: adapter.kind(),
                score: score.clamp(0, 100) as u8,
                reasons,
            }
        })
        .collect();
    // Stable sort preserves registration order on ties.
    ranked.sort_by(|a, b| b.score.cmp(&a.score));
    ranked
}

fn framework_affinity(kind: ProviderKind, detection: &DetectionResult) -> bool {
    match kind {
        ProviderKind::Vercel => {
            detection.project_type == ProjectType::Ssr || detection.framework.contains("Next")
        }
        ProviderKind::Netlify => {
            detection.is_pure_static
                || matches!(detection.framework.as_str(), "Gatsby" | "Eleventy" | "Static HTML")
        }
    }
}
