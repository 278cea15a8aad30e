use kgs_core::fingerprint::{recorded_fingerprint, values_fingerprint};
use kgs_core::{LiveState, Manifest};

/// `true` when applying `manifest` would change what is live.
pub fn is_changed(manifest: &Manifest, live: &LiveState) -> bool {
    match (manifest, live) {
        (Manifest::Raw(m), LiveState::Resource(doc)) => {
            recorded_fingerprint(doc) != Some(m.content_hash.as_str())
        }
        (Manifest::Release(m), LiveState::Release { chart, values }) => {
            *chart != m.chart.chart_id() || values_fingerprint(values) != m.values_fingerprint()
        }
        _ => true,
    }
}
