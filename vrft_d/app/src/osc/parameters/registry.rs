use super::base_param::{matches_address, BaseParam, ValueGetter};
use super::AvatarParameters;
use common::{UnifiedExpressions, UnifiedTrackingData};
use log::{debug, info};
use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};

/// A named value the daemon knows how to compute from tracking data.
#[derive(Clone)]
pub struct ParameterDefinition {
    name: String,
    get_value: ValueGetter,
}

impl ParameterDefinition {
    pub fn new(
        name: impl Into<String>,
        get_value: impl Fn(&UnifiedTrackingData) -> f32 + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            get_value: Arc::new(get_value),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

fn w(data: &UnifiedTrackingData, expr: UnifiedExpressions) -> f32 {
    data.shapes
        .get(expr as usize)
        .map(|shape| shape.weight)
        .unwrap_or(0.0)
}

/// Every parameter the daemon can drive.
pub fn default_definitions() -> Vec<ParameterDefinition> {
    use UnifiedExpressions as E;

    let mut defs = vec![
        // Head
        ParameterDefinition::new("v2/Head/Yaw", |d| d.head.head_yaw),
        ParameterDefinition::new("v2/Head/Pitch", |d| d.head.head_pitch),
        ParameterDefinition::new("v2/Head/Roll", |d| d.head.head_roll),
        ParameterDefinition::new("v2/Head/PosX", |d| d.head.head_pos_x),
        ParameterDefinition::new("v2/Head/PosY", |d| d.head.head_pos_y),
        ParameterDefinition::new("v2/Head/PosZ", |d| d.head.head_pos_z),
        // Gaze
        ParameterDefinition::new("v2/EyeLeftX", |d| -d.eye.left.gaze.x),
        ParameterDefinition::new("v2/EyeLeftY", |d| -d.eye.left.gaze.y),
        ParameterDefinition::new("v2/EyeRightX", |d| -d.eye.right.gaze.x),
        ParameterDefinition::new("v2/EyeRightY", |d| -d.eye.right.gaze.y),
        ParameterDefinition::new("v2/EyeX", |d| {
            -(d.eye.left.gaze.x + d.eye.right.gaze.x) / 2.0
        }),
        ParameterDefinition::new("v2/EyeY", |d| {
            -(d.eye.left.gaze.y + d.eye.right.gaze.y) / 2.0
        }),
        // Pupils, normalised against the running thresholds
        ParameterDefinition::new("v2/PupilDilation", |d| {
            (d.eye.left_diameter + d.eye.right_diameter) / 2.0
        }),
        ParameterDefinition::new("v2/PupilDiameterLeft", |d| d.eye.left_diameter),
        ParameterDefinition::new("v2/PupilDiameterRight", |d| d.eye.right_diameter),
        // Openness
        ParameterDefinition::new("v2/EyeOpenLeft", |d| d.eye.left.openness),
        ParameterDefinition::new("v2/EyeOpenRight", |d| d.eye.right.openness),
        ParameterDefinition::new("v2/EyeOpen", |d| {
            (d.eye.left.openness + d.eye.right.openness) / 2.0
        }),
        ParameterDefinition::new("v2/EyeClosedLeft", |d| 1.0 - d.eye.left.openness),
        ParameterDefinition::new("v2/EyeClosedRight", |d| 1.0 - d.eye.right.openness),
        ParameterDefinition::new("v2/EyeClosed", |d| {
            1.0 - (d.eye.left.openness + d.eye.right.openness) / 2.0
        }),
        ParameterDefinition::new("v2/EyeLidLeft", |d| {
            d.eye.left.openness * 0.75 + w(d, E::EyeWideLeft) * 0.25
        }),
        ParameterDefinition::new("v2/EyeLidRight", |d| {
            d.eye.right.openness * 0.75 + w(d, E::EyeWideRight) * 0.25
        }),
        // Combined shapes
        ParameterDefinition::new("v2/EyeWide", |d| {
            w(d, E::EyeWideLeft).max(w(d, E::EyeWideRight))
        }),
        ParameterDefinition::new("v2/EyeSquint", |d| {
            w(d, E::EyeSquintLeft).max(w(d, E::EyeSquintRight))
        }),
        ParameterDefinition::new("v2/BrowInnerUp", |d| {
            (w(d, E::BrowInnerUpLeft) + w(d, E::BrowInnerUpRight)) / 2.0
        }),
        ParameterDefinition::new("v2/JawX", |d| w(d, E::JawRight) - w(d, E::JawLeft)),
        ParameterDefinition::new("v2/CheekPuffSuck", |d| {
            (w(d, E::CheekPuffLeft) + w(d, E::CheekPuffRight)) / 2.0
                - (w(d, E::CheekSuckLeft) + w(d, E::CheekSuckRight)) / 2.0
        }),
        ParameterDefinition::new("v2/MouthX", |d| {
            (w(d, E::MouthUpperRight) + w(d, E::MouthLowerRight)) / 2.0
                - (w(d, E::MouthUpperLeft) + w(d, E::MouthLowerLeft)) / 2.0
        }),
        ParameterDefinition::new("v2/LipFunnel", |d| {
            (w(d, E::LipFunnelUpperLeft)
                + w(d, E::LipFunnelUpperRight)
                + w(d, E::LipFunnelLowerLeft)
                + w(d, E::LipFunnelLowerRight))
                / 4.0
        }),
        ParameterDefinition::new("v2/LipPucker", |d| {
            (w(d, E::LipPuckerUpperLeft)
                + w(d, E::LipPuckerUpperRight)
                + w(d, E::LipPuckerLowerLeft)
                + w(d, E::LipPuckerLowerRight))
                / 4.0
        }),
    ];

    // One raw parameter per unified shape
    defs.extend(UnifiedExpressions::all().map(|expr| {
        ParameterDefinition::new(format!("v2/{:?}", expr), move |d| w(d, expr))
    }));

    defs
}

/// Parameters the current avatar actually exposes, in a stable order.
#[derive(Debug, Default)]
pub struct RelevantParameters {
    params: Vec<BaseParam>,
}

impl RelevantParameters {
    pub fn new(params: Vec<BaseParam>) -> Self {
        Self { params }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn params(&self) -> &[BaseParam] {
        &self.params
    }

    pub fn get(&self, address: &str) -> Option<&BaseParam> {
        self.params.iter().find(|p| p.address() == address)
    }

    pub fn update(&self, data: &UnifiedTrackingData) {
        for param in &self.params {
            param.update(data);
        }
    }
}

/// Definitions plus the view derived from the current avatar.
///
/// Readers clone the `Arc` and never observe a half-built view.
pub struct ParameterRegistry {
    definitions: Vec<ParameterDefinition>,
    view: RwLock<Arc<RelevantParameters>>,
}

impl Default for ParameterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ParameterRegistry {
    pub fn new() -> Self {
        Self::with_definitions(default_definitions())
    }

    pub fn with_definitions(definitions: Vec<ParameterDefinition>) -> Self {
        Self {
            definitions,
            view: RwLock::new(Arc::new(RelevantParameters::empty())),
        }
    }

    pub fn definitions(&self) -> &[ParameterDefinition] {
        &self.definitions
    }

    pub fn view(&self) -> Arc<RelevantParameters> {
        self.view
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Rebuild the view for a new avatar and swap it in. Returns the number of
    /// bound addresses.
    pub fn reload(&self, avatar: &AvatarParameters) -> usize {
        let view = Arc::new(self.build_view(avatar));
        let count = view.len();
        self.publish(view);
        info!(
            "Avatar exposes {} parameters, {} relevant",
            avatar.len(),
            count
        );
        count
    }

    pub fn clear(&self) {
        self.publish(Arc::new(RelevantParameters::empty()));
        info!("Avatar unloaded, no relevant parameters");
    }

    fn publish(&self, view: Arc<RelevantParameters>) {
        *self.view.write().unwrap_or_else(PoisonError::into_inner) = view;
    }

    fn build_view(&self, avatar: &AvatarParameters) -> RelevantParameters {
        let mut addresses: Vec<_> = avatar.iter().collect();
        addresses.sort();

        let mut claimed = HashSet::new();
        let mut params = Vec::new();
        for def in &self.definitions {
            for &(address, param_type) in &addresses {
                if claimed.contains(address.as_str()) || !matches_address(&def.name, address) {
                    continue;
                }
                debug!("{} -> {} ({:?})", def.name, address, param_type);
                claimed.insert(address.as_str());
                params.push(BaseParam::new(
                    def.name.clone(),
                    address.clone(),
                    *param_type,
                    def.get_value.clone(),
                ));
            }
        }
        RelevantParameters::new(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::osc::parameters::ParamType;

    #[test]
    fn every_expression_has_a_definition() {
        let defs = default_definitions();
        for expr in UnifiedExpressions::all() {
            let name = format!("v2/{:?}", expr);
            assert!(defs.iter().any(|d| d.name() == name), "missing {name}");
        }
    }

    #[test]
    fn unmatched_addresses_are_ignored() {
        let registry = ParameterRegistry::new();
        let mut avatar = AvatarParameters::new();
        avatar.insert("/avatar/parameters/VelocityX".into(), ParamType::Float);
        avatar.insert("/avatar/parameters/GestureLeft".into(), ParamType::Int);

        assert_eq!(registry.reload(&avatar), 0);
        assert!(registry.view().is_empty());
    }

    #[test]
    fn prefixed_addresses_bind_separately() {
        let registry = ParameterRegistry::new();
        let mut avatar = AvatarParameters::new();
        avatar.insert("/avatar/parameters/v2/JawOpen".into(), ParamType::Float);
        avatar.insert("/avatar/parameters/FT/v2/JawOpen".into(), ParamType::Float);

        assert_eq!(registry.reload(&avatar), 2);
        let view = registry.view();
        assert!(view.get("/avatar/parameters/v2/JawOpen").is_some());
        assert!(view.get("/avatar/parameters/FT/v2/JawOpen").is_some());
    }

    #[test]
    fn old_view_survives_reload() {
        let registry = ParameterRegistry::new();
        let mut avatar = AvatarParameters::new();
        avatar.insert("/avatar/parameters/v2/EyeX".into(), ParamType::Float);
        registry.reload(&avatar);

        let old = registry.view();
        registry.clear();
        assert_eq!(old.len(), 1);
        assert!(registry.view().is_empty());
    }
}
