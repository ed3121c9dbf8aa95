//! Device model file parser: for each model key, the base type, threshold
//! voltage, optional terminal-voltage tolerances, and body-diode terminal
//! pairs.

use crate::error::IoResult;
use cvc_core::diagnostics::ImportDiagnostics;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseType {
    Mos,
    Resistor,
    Capacitor,
    Diode,
    Bipolar,
}

impl BaseType {
    fn from_letter(letter: char) -> Option<Self> {
        match letter.to_ascii_uppercase() {
            'M' => Some(BaseType::Mos),
            'R' => Some(BaseType::Resistor),
            'C' => Some(BaseType::Capacitor),
            'D' => Some(BaseType::Diode),
            'Q' => Some(BaseType::Bipolar),
            _ => None,
        }
    }
}

/// A parasitic diode formed between two of a device's terminals, given as
/// 0-indexed positions into (gate, source, drain, bulk).
#[derive(Debug, Clone, Copy)]
pub struct BodyDiode {
    pub anode: usize,
    pub cathode: usize,
}

#[derive(Debug, Clone)]
pub struct DeviceModel {
    pub model_key: String,
    pub base_type: BaseType,
    /// Raw resistance expression, evaluated against instance parameters
    /// at netlist-parse time (the parameter sublanguage is out of scope
    /// for this crate; a pre-evaluated constant is accepted here).
    pub resistance_expr: String,
    pub vth_mv: i32,
    pub max_vgs_mv: Option<i32>,
    pub max_vds_mv: Option<i32>,
    pub max_vbs_mv: Option<i32>,
    pub max_vbg_mv: Option<i32>,
    pub body_diodes: Vec<BodyDiode>,
    /// Lightly-doped drain variant: source and drain are not interchangeable.
    pub is_ldd: bool,
}

#[derive(Debug, Default)]
pub struct ModelTable {
    models: HashMap<String, DeviceModel>,
}

impl ModelTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, model_key: &str) -> Option<&DeviceModel> {
        self.models.get(model_key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeviceModel> {
        self.models.values()
    }

    pub fn insert(&mut self, model: DeviceModel) {
        self.models.insert(model.model_key.clone(), model);
    }

    /// Parse one model entry per line:
    /// `modelKey baseTypeLetter vth=<mV> [resistance=<expr>] [maxVgs=<mV>] [maxVds=<mV>] [maxVbs=<mV>] [maxVbg=<mV>] [diode=<a>-<b>]...`
    pub fn parse(&mut self, text: &str) -> IoResult<ImportDiagnostics> {
        let mut diagnostics = ImportDiagnostics::new();

        for (line_no, raw_line) in text.lines().enumerate() {
            let line_no = line_no + 1;
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut tokens = line.split_whitespace();
            let (Some(model_key), Some(base_letter)) = (tokens.next(), tokens.next()) else {
                diagnostics.add_error_at_line("parse", "model record missing key or base type", line_no);
                continue;
            };

            let Some(base_type) = base_letter.chars().next().and_then(BaseType::from_letter) else {
                diagnostics.add_error_at_line("parse", &format!("unknown base type `{base_letter}`"), line_no);
                continue;
            };

            let mut model = DeviceModel {
                model_key: model_key.to_string(),
                base_type,
                resistance_expr: String::new(),
                vth_mv: 0,
                max_vgs_mv: None,
                max_vds_mv: None,
                max_vbs_mv: None,
                max_vbg_mv: None,
                body_diodes: Vec::new(),
                is_ldd: false,
            };

            for field in tokens {
                let Some((key, value)) = field.split_once('=') else {
                    diagnostics.add_warning_at_line("parse", &format!("ignoring malformed field `{field}`"), line_no);
                    continue;
                };
                match key {
                    "vth" => model.vth_mv = value.parse().unwrap_or(0),
                    "resistance" => model.resistance_expr = value.to_string(),
                    "maxVgs" => model.max_vgs_mv = value.parse().ok(),
                    "maxVds" => model.max_vds_mv = value.parse().ok(),
                    "maxVbs" => model.max_vbs_mv = value.parse().ok(),
                    "maxVbg" => model.max_vbg_mv = value.parse().ok(),
                    "ldd" => model.is_ldd = value == "true",
                    "diode" => {
                        if let Some((a, b)) = value.split_once('-') {
                            if let (Ok(a), Ok(b)) = (a.parse(), b.parse()) {
                                model.body_diodes.push(BodyDiode { anode: a, cathode: b });
                            }
                        }
                    }
                    _ => diagnostics.add_warning_at_line("parse", &format!("unknown model field `{key}`"), line_no),
                }
            }

            self.insert(model);
            diagnostics.stats.devices += 1;
        }

        Ok(diagnostics)
    }
}
