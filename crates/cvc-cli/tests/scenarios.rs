//! End-to-end scenarios exercising `cvc check` against small fixture
//! netlists, run through the built binary rather than the library API so
//! parsing, propagation, and report formatting are all covered together.

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;
use tempfile::tempdir;

fn write(dir: &Path, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

fn check_cmd(dir: &Path, netlist: &str, model: &str, power: &str) -> Command {
    let netlist = write(dir, "netlist.cvc", netlist);
    let model = write(dir, "model.cvc", model);
    let power = write(dir, "power.cvc", power);
    let mut cmd = Command::cargo_bin("cvc").unwrap();
    cmd.args([
        "check",
        "--netlist",
        netlist.to_str().unwrap(),
        "--model",
        model.to_str().unwrap(),
        "--power",
        power.to_str().unwrap(),
    ]);
    cmd
}

#[test]
fn nmos_switch_pulls_drain_to_source_with_no_violations() {
    let dir = tempdir().unwrap();
    let mut cmd = check_cmd(
        dir.path(),
        "M1 nmos_model VDD GND A\n",
        "nmos_model M vth=400\n",
        "VDD min@1200 sim@1200 max@1200 power\nGND min@0 sim@0 max@0 power\n",
    );
    cmd.assert().success().stdout(predicate::str::contains("total: 0"));
}

#[test]
fn short_between_unrelated_powers_is_reported_as_a_leak() {
    let dir = tempdir().unwrap();
    let mut cmd = check_cmd(
        dir.path(),
        "M1 nmos_model VDD GND A\nM2 nmos_model VDD VDD GND\n",
        "nmos_model M vth=400\n",
        "VDD min@1200 sim@1200 max@1200 power\nGND min@0 sim@0 max@0 power\n",
    );
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("leak path between unrelated power rails"))
        .stdout(predicate::str::contains("1200mV"))
        .stdout(predicate::str::contains("leak path between unrelated powers: 1"))
        .stdout(predicate::str::contains("total: 1"));
}

#[test]
fn mos_diode_connection_reports_no_overvoltage() {
    // The exact Vth-drop arithmetic (Max(X) == VDD - Vth) is covered by
    // `cvc_core::propagator`'s unit tests; this just confirms the diode
    // connection doesn't trip a spurious Vgs overvoltage end to end.
    let dir = tempdir().unwrap();
    let mut cmd = check_cmd(
        dir.path(),
        "D1 nmos_model X VDD X\n",
        "nmos_model M vth=400\n",
        "VDD min@1200 sim@1200 max@1200 power\n",
    );
    cmd.assert().success().stdout(predicate::str::contains("total: 0"));
}

#[test]
fn reverse_biased_diode_is_not_flagged() {
    let dir = tempdir().unwrap();
    let mut cmd = check_cmd(
        dir.path(),
        "D2 diode_model GND VDD GND\n",
        "diode_model D vth=600\n",
        "VDD min@1200 sim@1200 max@1200 power\nGND min@0 sim@0 max@0 power\n",
    );
    cmd.assert().success().stdout(predicate::str::contains("total: 0"));
}

#[test]
fn forward_biased_diode_is_flagged() {
    let dir = tempdir().unwrap();
    let mut cmd = check_cmd(
        dir.path(),
        "D2 diode_model VDD GND GND\n",
        "diode_model D vth=600\n",
        "VDD min@1200 sim@1200 max@1200 power\nGND min@0 sim@0 max@0 power\n",
    );
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("forward-biased diode"))
        .stdout(predicate::str::contains("total: 1"));
}

#[test]
fn floating_shared_gate_flags_both_transistors() {
    let dir = tempdir().unwrap();
    let mut cmd = check_cmd(
        dir.path(),
        "N1 nmos_model FLOAT GND OUT\nP1 pmos_model FLOAT VDD OUT\n",
        "nmos_model M vth=400\npmos_model M vth=-400\n",
        "VDD min@1200 sim@1200 max@1200 power\nGND min@0 sim@0 max@0 power\n",
    );
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("floating gate: 2"))
        .stdout(predicate::str::contains("total: 2"));
}

#[test]
fn expected_voltage_mismatch_is_reported() {
    let dir = tempdir().unwrap();
    let mut cmd = check_cmd(
        dir.path(),
        "M1 nmos_model VDD GND A\n",
        "nmos_model M vth=400\n",
        "VDD min@1200 sim@1200 max@1200 power\nGND min@0 sim@0 max@0 power\nA expectSim@600\n",
    );
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("expected voltage mismatch"))
        .stdout(predicate::str::contains("expected 600mV, propagated 0mV"))
        .stdout(predicate::str::contains("total: 1"));
}

#[test]
fn validate_reports_structural_summary_without_propagating() {
    let dir = tempdir().unwrap();
    let netlist = write(dir.path(), "netlist.cvc", "M1 nmos_model VDD GND A\n");
    let model = write(dir.path(), "model.cvc", "nmos_model M vth=400\n");
    let power = write(
        dir.path(),
        "power.cvc",
        "VDD min@1200 sim@1200 max@1200 power\nGND min@0 sim@0 max@0 power\n",
    );
    let mut cmd = Command::cargo_bin("cvc").unwrap();
    cmd.args([
        "validate",
        "--netlist",
        netlist.to_str().unwrap(),
        "--model",
        model.to_str().unwrap(),
        "--power",
        power.to_str().unwrap(),
    ])
    .assert()
    .success()
    .stdout(predicate::str::contains("netlist:"))
    .stdout(predicate::str::contains("structural:"));
}

#[test]
fn sub_threshold_nmos_gate_is_flagged_as_a_possible_leak() {
    let dir = tempdir().unwrap();
    let mut cmd = check_cmd(
        dir.path(),
        "M1 nmos_model WEAK GND A\n",
        "nmos_model M vth=700\n",
        "WEAK min@300 sim@300 max@300 power\nGND min@0 sim@0 max@0 power\n",
    );
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("NMOS gate-source possible leak"))
        .stdout(predicate::str::contains("total: 1"));
}

#[test]
fn ldd_device_with_reversed_source_drain_is_flagged() {
    let dir = tempdir().unwrap();
    let mut cmd = check_cmd(
        dir.path(),
        "M1 nmos_ldd VDD VDD GND\n",
        "nmos_ldd M vth=400 ldd=true\n",
        "VDD min@1200 sim@1200 max@1200 power\nGND min@0 sim@0 max@0 power\n",
    );
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("LDD direction error"))
        .stdout(predicate::str::contains("total: 1"));
}

#[test]
fn transmission_gate_pair_with_matching_control_nets_is_flagged() {
    let dir = tempdir().unwrap();
    let mut cmd = check_cmd(
        dir.path(),
        "MN nmos_model EN SIG1 SIG2\nMP pmos_model EN_B SIG1 SIG2\n",
        "nmos_model M vth=400\npmos_model M vth=-400\n",
        "EN min@1200 sim@1200 max@1200 power\nEN_B min@1200 sim@1200 max@1200 power\n",
    );
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("opposite logic net mismatch"))
        .stdout(predicate::str::contains("total: 2"));
}

#[test]
fn per_model_overvoltage_ceiling_overrides_the_default() {
    let dir = tempdir().unwrap();
    let mut cmd = check_cmd(
        dir.path(),
        "M1 tight_model VDD GND A\n",
        "tight_model M vth=400 maxVgs=1000\n",
        "VDD min@1200 sim@1200 max@1200 power\nGND min@0 sim@0 max@0 power\n",
    );
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("gate oxide overvoltage"))
        .stdout(predicate::str::contains("total: 1"));
}

#[test]
fn config_command_prints_toml_defaults() {
    let mut cmd = Command::cargo_bin("cvc").unwrap();
    cmd.arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("overvoltage_limit_mv"));
}
