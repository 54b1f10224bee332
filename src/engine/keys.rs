/// Key layout of the telemetry cache.
///
/// Works with any key-value backend: two string keys and a last-update
/// marker per asset, plus one set holding every live asset id.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeySchema;

impl KeySchema {
    pub const ACTIVE_ASSETS: &'static str = "assets:active";

    pub fn position(asset_id: &str) -> String {
        format!("asset:{asset_id}:position")
    }

    pub fn state(asset_id: &str) -> String {
        format!("asset:{asset_id}:state")
    }

    pub fn last_update(asset_id: &str) -> String {
        format!("asset:{asset_id}:last_update")
    }

    /// All keys owned by one asset, excluding its active-set membership.
    pub fn asset_keys(asset_id: &str) -> Vec<String> {
        vec![
            Self::position(asset_id),
            Self::state(asset_id),
            Self::last_update(asset_id),
        ]
    }
}
