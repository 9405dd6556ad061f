//! Panel topology parsing and LED ordering.
//!
//! The fixture reports its panels in `panelLayout/layout.positionData`. Only
//! LED-bearing shapes take part in streaming; the remaining panels (power
//! supplies, controllers, connectors) are dropped. The survivors are ordered by
//! position so that index `i` of a color buffer always addresses the same
//! physical panel.

use serde::Deserialize;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use crate::api::dto::DeviceConfig;
use crate::error::DeviceError;

/// Firmware shape-type codes.
///
/// Code 0 is shared by the original triangle panels and the later HD light
/// strip; both carry LEDs so the alias does not change classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShapeType {
    /// Also reported by HD light strips.
    Triangle,
    Rhythm,
    Square,
    ControlSquarePrimary,
    ControlSquarePassive,
    PowerSupply,
    HexagonShapes,
    TriangleShapes,
    MiniTriangleShapes,
    ShapesController,
    ElementsHexagons,
    ElementsHexagonsCorner,
    LinesConnector,
    LightLines,
    LightLinesSingleZone,
    ControllerCap,
    PowerConnector,
    LightStrip4D,
    SkylightPanel,
    SkylightControllerPrimary,
    SkylightControllerPassive,
    Unknown(u16),
}

impl ShapeType {
    pub fn from_code(code: u16) -> Self {
        match code {
            0 => ShapeType::Triangle,
            1 => ShapeType::Rhythm,
            2 => ShapeType::Square,
            3 => ShapeType::ControlSquarePrimary,
            4 => ShapeType::ControlSquarePassive,
            5 => ShapeType::PowerSupply,
            7 => ShapeType::HexagonShapes,
            8 => ShapeType::TriangleShapes,
            9 => ShapeType::MiniTriangleShapes,
            12 => ShapeType::ShapesController,
            14 => ShapeType::ElementsHexagons,
            15 => ShapeType::ElementsHexagonsCorner,
            16 => ShapeType::LinesConnector,
            17 => ShapeType::LightLines,
            18 => ShapeType::LightLinesSingleZone,
            19 => ShapeType::ControllerCap,
            20 => ShapeType::PowerConnector,
            29 => ShapeType::LightStrip4D,
            30 => ShapeType::SkylightPanel,
            31 => ShapeType::SkylightControllerPrimary,
            32 => ShapeType::SkylightControllerPassive,
            other => ShapeType::Unknown(other),
        }
    }

    pub fn code(&self) -> u16 {
        match self {
            ShapeType::Triangle => 0,
            ShapeType::Rhythm => 1,
            ShapeType::Square => 2,
            ShapeType::ControlSquarePrimary => 3,
            ShapeType::ControlSquarePassive => 4,
            ShapeType::PowerSupply => 5,
            ShapeType::HexagonShapes => 7,
            ShapeType::TriangleShapes => 8,
            ShapeType::MiniTriangleShapes => 9,
            ShapeType::ShapesController => 12,
            ShapeType::ElementsHexagons => 14,
            ShapeType::ElementsHexagonsCorner => 15,
            ShapeType::LinesConnector => 16,
            ShapeType::LightLines => 17,
            ShapeType::LightLinesSingleZone => 18,
            ShapeType::ControllerCap => 19,
            ShapeType::PowerConnector => 20,
            ShapeType::LightStrip4D => 29,
            ShapeType::SkylightPanel => 30,
            ShapeType::SkylightControllerPrimary => 31,
            ShapeType::SkylightControllerPassive => 32,
            ShapeType::Unknown(code) => *code,
        }
    }

    /// Built-in classification. `None` for codes missing from the catalog.
    pub fn has_leds(&self) -> Option<bool> {
        match self {
            ShapeType::Triangle
            | ShapeType::Square
            | ShapeType::ControlSquarePrimary
            | ShapeType::ControlSquarePassive
            | ShapeType::HexagonShapes
            | ShapeType::TriangleShapes
            | ShapeType::MiniTriangleShapes
            | ShapeType::ElementsHexagons
            | ShapeType::ElementsHexagonsCorner
            | ShapeType::LightLines
            | ShapeType::LightLinesSingleZone
            | ShapeType::LightStrip4D
            | ShapeType::SkylightPanel => Some(true),

            ShapeType::Rhythm
            | ShapeType::PowerSupply
            | ShapeType::ShapesController
            | ShapeType::LinesConnector
            | ShapeType::ControllerCap
            | ShapeType::PowerConnector
            | ShapeType::SkylightControllerPrimary
            | ShapeType::SkylightControllerPassive => Some(false),

            ShapeType::Unknown(_) => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PanelDescriptor {
    pub id: u16,
    pub shape_type: ShapeType,
    pub x: i32,
    /// Grows upwards in the fixture's coordinate system.
    pub y: i32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PositionDto {
    panel_id: u16,
    x: i32,
    y: i32,
    shape_type: u16,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LayoutDto {
    #[serde(default)]
    num_panels: Option<usize>,
    position_data: Vec<PositionDto>,
}

/// LED-bearing panels in streaming order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FixtureLayout {
    panels: Vec<PanelDescriptor>,
    panel_ids: Vec<u16>,
}

impl FixtureLayout {
    fn from_panels(panels: Vec<PanelDescriptor>) -> Self {
        let panel_ids = panels.iter().map(|p| p.id).collect();
        Self { panels, panel_ids }
    }

    pub fn panels(&self) -> &[PanelDescriptor] {
        &self.panels
    }

    pub fn panel_ids(&self) -> &[u16] {
        &self.panel_ids
    }

    pub fn len(&self) -> usize {
        self.panels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.panels.is_empty()
    }
}

/// Ordering and classification rules applied to a raw layout.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LayoutPolicy {
    pub top_down: bool,
    pub left_right: bool,
    pub expected_led_count: Option<usize>,
    pub shape_overrides: BTreeMap<u16, bool>,
}

impl Default for LayoutPolicy {
    fn default() -> Self {
        Self {
            top_down: true,
            left_right: true,
            expected_led_count: None,
            shape_overrides: BTreeMap::new(),
        }
    }
}

impl From<&DeviceConfig> for LayoutPolicy {
    fn from(config: &DeviceConfig) -> Self {
        Self {
            top_down: config.panel_order_top_down,
            left_right: config.panel_order_left_right,
            expected_led_count: config.hardware_led_count,
            shape_overrides: config.shape_type_overrides.clone(),
        }
    }
}

impl LayoutPolicy {
    pub fn has_leds(&self, shape_type: ShapeType) -> bool {
        if let Some(forced) = self.shape_overrides.get(&shape_type.code()) {
            return *forced;
        }
        match shape_type.has_leds() {
            Some(has) => has,
            None => {
                log::warn!(shape_type = shape_type.code(); "Unknown panel shape type, treated as without LEDs");
                false
            }
        }
    }

    /// Total order: rows by `y`, then columns by `x`, ties by panel id.
    fn compare(&self, a: &PanelDescriptor, b: &PanelDescriptor) -> Ordering {
        let rows = if self.top_down { b.y.cmp(&a.y) } else { a.y.cmp(&b.y) };
        let cols = if self.left_right { a.x.cmp(&b.x) } else { b.x.cmp(&a.x) };
        rows.then(cols).then(a.id.cmp(&b.id))
    }
}

/// Parses a `panelLayout/layout` document into the streaming layout.
///
/// Accepts the layout object itself or its parent `panelLayout` object.
pub fn resolve_layout(document: &Value, policy: &LayoutPolicy) -> Result<FixtureLayout, DeviceError> {
    let layout_value = match document.get("layout") {
        Some(inner) if document.get("positionData").is_none() => inner,
        _ => document,
    };

    let layout = LayoutDto::deserialize(layout_value)
        .map_err(|e| DeviceError::Protocol(format!("Invalid panel layout: {e}")))?;

    if let Some(num) = layout.num_panels {
        if num != layout.position_data.len() {
            log::warn!(
                num_panels = num,
                positions = layout.position_data.len();
                "Panel count differs from position data"
            );
        }
    }

    let mut seen = HashSet::new();
    let mut panels = Vec::with_capacity(layout.position_data.len());
    for pos in &layout.position_data {
        if !seen.insert(pos.panel_id) {
            return Err(DeviceError::Protocol(format!(
                "Duplicate panel id {} in layout",
                pos.panel_id
            )));
        }

        let shape_type = ShapeType::from_code(pos.shape_type);
        if policy.has_leds(shape_type) {
            panels.push(PanelDescriptor {
                id: pos.panel_id,
                shape_type,
                x: pos.x,
                y: pos.y,
            });
        } else {
            log::debug!(panel_id = pos.panel_id, shape_type = pos.shape_type; "Skipping panel without LEDs");
        }
    }

    if panels.is_empty() {
        return Err(DeviceError::LayoutMismatch(
            "Fixture reports no LED-bearing panels".to_string(),
        ));
    }

    if let Some(expected) = policy.expected_led_count {
        if expected != panels.len() {
            return Err(DeviceError::LayoutMismatch(format!(
                "Fixture has {} LED panels, configuration expects {}",
                panels.len(),
                expected
            )));
        }
    }

    panels.sort_by(|a, b| policy.compare(a, b));

    Ok(FixtureLayout::from_panels(panels))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    /// 2x2 grid of squares plus a power supply and a shapes controller.
    fn grid_document() -> Value {
        json!({
            "numPanels": 6,
            "sideLength": 100,
            "positionData": [
                { "panelId": 10, "x": 0,   "y": 100, "o": 0, "shapeType": 2 },
                { "panelId": 11, "x": 100, "y": 100, "o": 0, "shapeType": 2 },
                { "panelId": 12, "x": 0,   "y": 0,   "o": 0, "shapeType": 2 },
                { "panelId": 13, "x": 100, "y": 0,   "o": 0, "shapeType": 2 },
                { "panelId": 1,  "x": 50,  "y": 50,  "o": 0, "shapeType": 5 },
                { "panelId": 2,  "x": 50,  "y": 60,  "o": 0, "shapeType": 12 }
            ]
        })
    }

    fn policy(top_down: bool, left_right: bool) -> LayoutPolicy {
        LayoutPolicy {
            top_down,
            left_right,
            ..LayoutPolicy::default()
        }
    }

    fn ten_panels() -> Value {
        let mut positions = Vec::new();
        for id in 0..8u16 {
            positions.push(json!({ "panelId": 100 + id, "x": id * 10, "y": 0, "o": 0, "shapeType": 8 }));
        }
        positions.push(json!({ "panelId": 7,  "x": 0, "y": 0, "o": 0, "shapeType": 5 }));
        positions.push(json!({ "panelId": 42, "x": 0, "y": 0, "o": 0, "shapeType": 12 }));
        json!({ "numPanels": 10, "positionData": positions })
    }

    #[test]
    fn test_ten_panels_two_excluded() {
        let layout = resolve_layout(&ten_panels(), &LayoutPolicy::default()).unwrap();
        assert_eq!(layout.len(), 8);
        assert!(!layout.panel_ids().contains(&7));
        assert!(!layout.panel_ids().contains(&42));
        assert!(layout
            .panels()
            .iter()
            .all(|p| p.shape_type.has_leds() == Some(true)));
    }

    #[test]
    fn test_ordering_per_flag_combination() {
        let doc = grid_document();
        let cases = [
            (true, true, vec![10, 11, 12, 13]),
            (true, false, vec![11, 10, 13, 12]),
            (false, true, vec![12, 13, 10, 11]),
            (false, false, vec![13, 12, 11, 10]),
        ];
        for (top_down, left_right, expected) in cases {
            let layout = resolve_layout(&doc, &policy(top_down, left_right)).unwrap();
            assert_eq!(layout.panel_ids(), expected.as_slice(), "td={top_down} lr={left_right}");
        }
    }

    #[test]
    fn test_orderings_are_permutations() {
        let doc = ten_panels();
        let mut reference: Vec<u16> = resolve_layout(&doc, &policy(true, true))
            .unwrap()
            .panel_ids()
            .to_vec();
        reference.sort_unstable();

        for (td, lr) in [(true, false), (false, true), (false, false)] {
            let mut ids = resolve_layout(&doc, &policy(td, lr)).unwrap().panel_ids().to_vec();
            ids.sort_unstable();
            assert_eq!(ids, reference);
        }
    }

    #[test]
    fn test_resolution_is_deterministic() {
        // Same position for every panel: order falls back to panel id.
        let doc = json!({
            "positionData": [
                { "panelId": 9, "x": 5, "y": 5, "o": 0, "shapeType": 7 },
                { "panelId": 3, "x": 5, "y": 5, "o": 0, "shapeType": 7 },
                { "panelId": 6, "x": 5, "y": 5, "o": 0, "shapeType": 7 }
            ]
        });
        let first = resolve_layout(&doc, &LayoutPolicy::default()).unwrap();
        for _ in 0..5 {
            assert_eq!(resolve_layout(&doc, &LayoutPolicy::default()).unwrap(), first);
        }
        assert_eq!(first.panel_ids(), &[3, 6, 9]);
    }

    #[test]
    fn test_accepts_panel_layout_wrapper() {
        let doc = json!({ "globalOrientation": { "value": 0 }, "layout": grid_document() });
        let layout = resolve_layout(&doc, &LayoutPolicy::default()).unwrap();
        assert_eq!(layout.len(), 4);
    }

    #[test]
    fn test_no_led_panels_is_mismatch() {
        let doc = json!({
            "positionData": [ { "panelId": 1, "x": 0, "y": 0, "o": 0, "shapeType": 5 } ]
        });
        let err = resolve_layout(&doc, &LayoutPolicy::default()).unwrap_err();
        assert!(matches!(err, DeviceError::LayoutMismatch(_)));
    }

    #[test]
    fn test_expected_count_mismatch() {
        let policy = LayoutPolicy {
            expected_led_count: Some(5),
            ..LayoutPolicy::default()
        };
        let err = resolve_layout(&grid_document(), &policy).unwrap_err();
        assert!(matches!(err, DeviceError::LayoutMismatch(_)));
    }

    #[test]
    fn test_shape_override() {
        let mut overrides = BTreeMap::new();
        overrides.insert(5, true);
        overrides.insert(99, true);
        let policy = LayoutPolicy {
            shape_overrides: overrides,
            ..LayoutPolicy::default()
        };
        let doc = json!({
            "positionData": [
                { "panelId": 1, "x": 0, "y": 0, "o": 0, "shapeType": 5 },
                { "panelId": 2, "x": 1, "y": 0, "o": 0, "shapeType": 99 },
                { "panelId": 3, "x": 2, "y": 0, "o": 0, "shapeType": 98 }
            ]
        });
        let layout = resolve_layout(&doc, &policy).unwrap();
        assert_eq!(layout.panel_ids(), &[1, 2]);
    }

    #[test]
    fn test_malformed_layout_is_protocol_error() {
        let err = resolve_layout(&json!({ "numPanels": 3 }), &LayoutPolicy::default()).unwrap_err();
        assert!(matches!(err, DeviceError::Protocol(_)));
    }

    #[test]
    fn test_duplicate_panel_id() {
        let doc = json!({
            "positionData": [
                { "panelId": 1, "x": 0, "y": 0, "o": 0, "shapeType": 2 },
                { "panelId": 1, "x": 1, "y": 0, "o": 0, "shapeType": 2 }
            ]
        });
        assert!(matches!(
            resolve_layout(&doc, &LayoutPolicy::default()),
            Err(DeviceError::Protocol(_))
        ));
    }

    #[test]
    fn test_shape_code_roundtrip() {
        for code in [0u16, 1, 2, 5, 12, 17, 29, 32, 77] {
            assert_eq!(ShapeType::from_code(code).code(), code);
        }
    }
}
