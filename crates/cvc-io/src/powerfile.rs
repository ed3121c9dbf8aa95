//! Power/ground declaration file parser:
//!
//! ```text
//! NAME [ALIAS] {voltage@E|min@E sim@E max@E|open|input|power|resistor|permit@FAMILY|prohibit@FAMILY|expectMin@E|expectSim@E|expectMax@E} ...
//! family FAMILY member1,member2,...
//! #define MACRO value
//! ```
//!
//! `E` is either a bare literal/macro-name token, or a double-quoted
//! postfix voltage expression (e.g. `"VDD VT -"`) evaluated later by
//! [`cvc_core::power::PowerTable::evaluate_expression`].

use crate::error::IoResult;
use cvc_core::diagnostics::ImportDiagnostics;
use cvc_core::ids::{NetId, Voltage};
use cvc_core::power::{ActiveType, Power, PowerTable, PowerType};
use std::collections::HashMap;

/// Parses directive text into a [`PowerTable`]. Net ids for declared
/// power signals are assigned by the caller's net-name interning (the
/// same table used by [`crate::netlist::NetlistParser`]); this parser
/// takes a `resolve` closure so both parsers share one net namespace.
pub struct PowerFileParser<'a> {
    resolve: Box<dyn FnMut(&str) -> NetId + 'a>,
    pending_families: Vec<(String, Vec<String>)>,
    signal_to_net: HashMap<String, NetId>,
}

impl<'a> PowerFileParser<'a> {
    pub fn new(resolve: impl FnMut(&str) -> NetId + 'a) -> Self {
        Self {
            resolve: Box::new(resolve),
            pending_families: Vec::new(),
            signal_to_net: HashMap::new(),
        }
    }

    fn next_expression_token<'t>(iter: &mut std::iter::Peekable<impl Iterator<Item = &'t str>>) -> Option<String> {
        let first = iter.next()?;
        if let Some(rest) = first.strip_prefix('"') {
            if let Some(end) = rest.strip_suffix('"') {
                return Some(end.to_string());
            }
            let mut parts = vec![rest.to_string()];
            for token in iter.by_ref() {
                if let Some(end) = token.strip_suffix('"') {
                    parts.push(end.to_string());
                    return Some(parts.join(" "));
                }
                parts.push(token.to_string());
            }
            return Some(parts.join(" "));
        }
        Some(first.to_string())
    }

    pub fn parse(&mut self, text: &str, powers: &mut PowerTable) -> IoResult<ImportDiagnostics> {
        let mut diagnostics = ImportDiagnostics::new();

        for (line_no, raw_line) in text.lines().enumerate() {
            let line_no = line_no + 1;
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('*') {
                continue;
            }

            if let Some(rest) = line.strip_prefix("#define") {
                let mut parts = rest.trim().splitn(2, char::is_whitespace);
                let (Some(name), Some(value)) = (parts.next(), parts.next()) else {
                    diagnostics.add_error_at_line("parse", "malformed #define", line_no);
                    continue;
                };
                powers.define_macro(name.trim(), value.trim());
                continue;
            }

            if let Some(rest) = line.strip_prefix("family") {
                let mut tokens = rest.split_whitespace();
                let (Some(family), Some(members)) = (tokens.next(), tokens.next()) else {
                    diagnostics.add_error_at_line("parse", "malformed family directive", line_no);
                    continue;
                };
                let member_names = members.split(',').map(|s| s.trim().to_string()).collect();
                self.pending_families.push((family.to_string(), member_names));
                continue;
            }

            let mut tokens = line.split_whitespace().peekable();
            let Some(name) = tokens.next() else { continue };

            let alias = tokens
                .peek()
                .filter(|t| !t.contains('@') && !matches!(**t, "open" | "input" | "power" | "resistor"))
                .map(|s| s.to_string());
            if alias.is_some() {
                tokens.next();
            }

            let net_id = (self.resolve)(name);
            self.signal_to_net.insert(name.to_string(), net_id);
            if let Some(alias) = &alias {
                self.signal_to_net.insert(alias.clone(), net_id);
            }
            let mut power = Power::new(net_id, name);
            let mut permit_entries: Vec<String> = Vec::new();
            let mut prohibit_entries: Vec<String> = Vec::new();

            while let Some(token) = tokens.next() {
                match token {
                    "open" => power.power_type |= PowerType::HIZ,
                    "input" => power.power_type |= PowerType::INPUT,
                    "power" => power.power_type |= PowerType::POWER,
                    "resistor" => power.power_type |= PowerType::RESISTOR,
                    _ => {
                        let Some((key, _)) = token.split_once('@') else {
                            diagnostics.add_warning_at_line("parse", &format!("ignoring unrecognized directive `{token}`"), line_no);
                            continue;
                        };
                        // Re-derive the value starting from this token
                        // (it may open a quoted multi-word expression).
                        let value_start = &token[key.len() + 1..];
                        let value = if value_start.starts_with('"') {
                            let mut rest = std::iter::once(value_start).chain(tokens.by_ref()).peekable();
                            Self::next_expression_token(&mut rest).unwrap_or_default()
                        } else {
                            value_start.to_string()
                        };

                        match key {
                            "voltage" => {
                                let v = Self::resolve_literal(&value, powers);
                                power.min_voltage = v;
                                power.sim_voltage = v;
                                power.max_voltage = v;
                            }
                            "min" => power.min_voltage = Self::resolve_literal(&value, powers),
                            "sim" => power.sim_voltage = Self::resolve_literal(&value, powers),
                            "max" => power.max_voltage = Self::resolve_literal(&value, powers),
                            "permit" => permit_entries.push(value),
                            "prohibit" => prohibit_entries.push(value),
                            "expectMin" => power.expected_min = Some(value),
                            "expectSim" => power.expected_sim = Some(value),
                            "expectMax" => power.expected_max = Some(value),
                            other => {
                                diagnostics.add_warning_at_line("parse", &format!("unknown directive key `{other}`"), line_no);
                            }
                        }
                    }
                }
            }

            // A power carries one relative set: `prohibit` (an enemy list
            // that overrides any otherwise-expected relation) if declared,
            // else `permit` (a friend list). Declaring both on one power is
            // unusual; prohibit wins since it's the safety-relevant one.
            if !prohibit_entries.is_empty() {
                power.relative_friendly = false;
                power.relative_set = prohibit_entries;
            } else if !permit_entries.is_empty() {
                power.relative_friendly = true;
                power.relative_set = permit_entries;
            }

            if power.min_voltage.is_known() && power.sim_voltage.is_known() && power.max_voltage.is_known() {
                if power.min_voltage.value() > power.sim_voltage.value() || power.sim_voltage.value() > power.max_voltage.value() {
                    diagnostics.add_error_with_entity("validation", "min <= sim <= max invariant violated", name);
                }
            }

            diagnostics.stats.power_definitions += 1;
            if !powers.insert(power) {
                diagnostics.add_warning_with_entity(
                    "validation",
                    "duplicate power definition on net; keeping the first declaration",
                    name,
                );
            }
        }

        for (family, members) in &self.pending_families {
            for member in members {
                if let Some(&net_id) = self.signal_to_net.get(member) {
                    if let Some(power) = powers.get_mut(net_id) {
                        power.family = family.clone();
                    }
                }
            }
            // Fold every other family member's signal into this member's
            // own relative set, mirroring how `permit@FAMILY` expands in
            // the power file format. A power that declared an explicit
            // enemy list (`relative_friendly == false`) keeps it as-is —
            // family membership never turns a declared prohibition into a
            // friend relation.
            for member in members {
                let Some(&net_id) = self.signal_to_net.get(member) else { continue };
                let other_signals: Vec<String> = members
                    .iter()
                    .filter(|m| *m != member)
                    .cloned()
                    .collect();
                if let Some(power) = powers.get_mut(net_id) {
                    if power.relative_friendly {
                        for signal in other_signals {
                            if !power.relative_set.contains(&signal) {
                                power.relative_set.push(signal);
                            }
                        }
                    }
                }
            }
        }

        Ok(diagnostics)
    }

    fn resolve_literal(token: &str, powers: &PowerTable) -> Voltage {
        if let Ok(mv) = token.parse::<i32>() {
            return Voltage::mv(mv);
        }
        powers.evaluate_expression(token, cvc_core::power::Interpretation::Sim)
    }
}
