//! Static per-model limits (§4.4).
//!
//! Consulted by callers at configuration time to validate user input before
//! a job starts; no protocol layer reads this table, since the printer
//! itself does not change wire framing per model.

/// Printer head resolution, shared by every known model.
const DOTS_PER_MM: f64 = 203.0 / 25.4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Model {
    B1,
    B18,
    B21,
    B203,
    D11,
    D110,
}

#[derive(Debug, Clone, Copy)]
pub struct ModelSpec {
    pub model: Model,
    pub name: &'static str,
    pub max_width_px: u32,
    pub max_density: u8,
    pub supported_widths: &'static [u32],
    pub label_types: &'static [u8],
}

impl ModelSpec {
    /// `max_width_px * 25.4 / 203`, the derived maximum printable width in mm (§3).
    pub fn max_width_mm(&self) -> f64 {
        self.max_width_px as f64 / DOTS_PER_MM
    }

    /// Convert a requested width in millimeters to device pixels, rounding
    /// down so the result never exceeds what the caller asked for.
    pub fn mm_to_px(&self, mm: f64) -> u32 {
        (mm * DOTS_PER_MM).floor() as u32
    }

    pub fn supports_label_type(&self, label_type: u8) -> bool {
        self.label_types.contains(&label_type)
    }

    pub fn supports_width_px(&self, width_px: u32) -> bool {
        width_px <= self.max_width_px
    }
}

const SPECS: &[ModelSpec] = &[
    ModelSpec {
        model: Model::B1,
        name: "B1",
        max_width_px: 384,
        max_density: 5,
        supported_widths: &[40, 50, 55, 65],
        label_types: &[1, 2, 3],
    },
    ModelSpec {
        model: Model::B18,
        name: "B18",
        max_width_px: 96,
        max_density: 3,
        supported_widths: &[12, 15],
        label_types: &[1, 2],
    },
    ModelSpec {
        model: Model::B21,
        name: "B21",
        max_width_px: 384,
        max_density: 5,
        supported_widths: &[14, 25, 40, 50],
        label_types: &[1, 2, 3],
    },
    ModelSpec {
        model: Model::B203,
        name: "B203",
        max_width_px: 576,
        max_density: 5,
        supported_widths: &[25, 40, 50, 70],
        label_types: &[1, 2, 3],
    },
    ModelSpec {
        model: Model::D11,
        name: "D11",
        max_width_px: 96,
        max_density: 3,
        supported_widths: &[12],
        label_types: &[1, 2],
    },
    ModelSpec {
        model: Model::D110,
        name: "D110",
        max_width_px: 96,
        max_density: 3,
        supported_widths: &[12, 14],
        label_types: &[1, 2],
    },
];

/// Look up a model's static limits.
pub fn spec(model: Model) -> &'static ModelSpec {
    SPECS
        .iter()
        .find(|s| s.model == model)
        .expect("every Model variant has a ModelSpec entry")
}
