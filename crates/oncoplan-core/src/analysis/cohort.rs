//! Cohort statistics over extracted patient profiles.

use super::classify::{PatientProfile, Treatment};
use super::tally;

const ELDERLY_AGE: u32 = 75;
const UNQUANTIFIED_CHANGE: f64 = -1.0;

/// `X out of Y (Z%)`; a zero total reads as `0.0%`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn count_pct(count: usize, total: usize, decimals: usize) -> String {
    if total == 0 {
        return format!("{count} out of {total} (0.0%)");
    }
    let pct = count as f64 * 100.0 / total as f64;
    format!("{count} out of {total} ({pct:.decimals$}%)")
}

#[allow(clippy::cast_precision_loss)]
fn share(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 * 100.0 / total as f64
    }
}

#[allow(clippy::cast_precision_loss)]
fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn treated<'a>(patients: &[&'a PatientProfile], treatment: Treatment) -> Vec<&'a PatientProfile> {
    patients
        .iter()
        .copied()
        .filter(|p| p.treatment() == treatment)
        .collect()
}

struct Report {
    out: String,
}

impl Report {
    fn line(&mut self, text: impl AsRef<str>) {
        self.out.push_str(text.as_ref());
        self.out.push('\n');
    }

    fn heading(&mut self, n: u8, title: &str) {
        self.line(format!("\n--- Analysis {n}: {title} ---"));
    }

    fn counts<'a>(&mut self, items: impl IntoIterator<Item = &'a str>) -> bool {
        let counts = tally(items);
        for (item, count) in &counts {
            self.line(format!("- \"{item}\": {count} occurrences"));
        }
        !counts.is_empty()
    }

    /// Reasons, most common first, or `empty` when none are recorded.
    fn reasons(&mut self, patients: &[&PatientProfile], empty: &str) {
        let reasons = patients
            .iter()
            .map(|p| p.reason.as_str())
            .filter(|r| !r.is_empty());
        if !self.counts(reasons) {
            self.line(empty);
        }
    }

    fn illnesses(&mut self, patients: &[&PatientProfile], title: &str) {
        self.line(format!("\n{title}:"));
        let all = patients
            .iter()
            .flat_map(|p| p.background_illnesses.iter().map(String::as_str));
        if !self.counts(all) {
            self.line("- No background illnesses recorded");
        }
    }

    fn breakdown(&mut self, group: &[&PatientProfile]) {
        let immuno = treated(group, Treatment::ImmunoOnly).len();
        let combo = treated(group, Treatment::Combo).len();
        self.line(format!(
            "- Immunotherapy Only: {immuno} ({:.1}%)",
            share(immuno, group.len())
        ));
        self.line(format!(
            "- Immunotherapy and Chemotherapy: {combo} ({:.1}%)",
            share(combo, group.len())
        ));
    }
}

/// Render the fourteen cohort analyses as plain text.
#[must_use]
pub fn render_report(profiles: &[PatientProfile]) -> String {
    let mut r = Report { out: String::new() };
    r.line("--- Performing Analyses ---");
    if profiles.is_empty() {
        r.line("No patients to analyze.");
        return r.out;
    }

    let all: Vec<&PatientProfile> = profiles.iter().collect();
    let total = all.len();
    let immuno = treated(&all, Treatment::ImmunoOnly);
    let combo = treated(&all, Treatment::Combo);

    r.line(format!("Total Patients: {total}"));
    r.line(format!(
        "Immuno Only Patients: {} ({:.1}%)",
        immuno.len(),
        share(immuno.len(), total)
    ));
    r.line(format!(
        "Combo Patients: {} ({:.1}%)",
        combo.len(),
        share(combo.len(), total)
    ));

    average_age(&mut r, &immuno);
    treatment_reasons(&mut r, &immuno, &combo);
    high_pdl1(&mut r, &all);
    low_pdl1_immuno(&mut r, &immuno);
    pdl1_band(&mut r, &all, 6, 0.5);
    pdl1_band(&mut r, &all, 7, 0.01);
    dosage_changes(&mut r, &combo);
    immuno_illnesses(&mut r, &immuno);
    contrary_reasons(&mut r, &immuno, &combo);
    performance_status(&mut r, &all);

    r.line("\n--- End of Analyses ---");
    r.out
}

fn average_age(r: &mut Report, immuno: &[&PatientProfile]) {
    r.heading(1, "Average age of patients who received Immunotherapy Only");
    let ages: Vec<f64> = immuno.iter().filter_map(|p| p.age).map(f64::from).collect();
    if ages.is_empty() {
        r.line("No patients with 'Immunotherapy Only' treatment and known age found.");
    } else {
        r.line(format!(
            "Average age: {:.2} years (based on {} patients)",
            mean(&ages),
            ages.len()
        ));
    }
}

fn treatment_reasons(r: &mut Report, immuno: &[&PatientProfile], combo: &[&PatientProfile]) {
    for (n, label, group) in [(2, "Immunotherapy Only", immuno), (3, "Combo", combo)] {
        r.heading(n, &format!("Reasons for getting {label} (Most common first)"));
        if group.is_empty() {
            r.line(format!("No patients with '{label}' treatment found."));
            continue;
        }
        r.line("Reasons:");
        r.reasons(group, &format!("No reasons specified for '{label}' patients."));
    }
}

fn high_pdl1(r: &mut Report, all: &[&PatientProfile]) {
    r.heading(4, "Patients with PDL1 >= 0.5 - Treatment breakdown");
    let high: Vec<&PatientProfile> = all
        .iter()
        .copied()
        .filter(|p| p.pdl1_score.is_some_and(|s| s >= 0.5))
        .collect();
    if high.is_empty() {
        r.line("No patients with PDL1 >= 0.5 found.");
        return;
    }
    r.line(format!("Total patients with PDL1 >= 0.5: {}", high.len()));
    r.breakdown(&high);

    let immuno = treated(&high, Treatment::ImmunoOnly);
    let combo = treated(&high, Treatment::Combo);
    for (label, group) in [
        ("Immunotherapy Only", &immuno),
        ("Immunotherapy and Chemotherapy", &combo),
    ] {
        if !group.is_empty() {
            r.line(format!("\nReasons for {label} (PDL1 >= 0.5):"));
            r.reasons(group, "- No reasons specified");
        }
    }
    for (label, group) in [
        ("Immunotherapy Only", &immuno),
        ("Immunotherapy and Chemotherapy", &combo),
    ] {
        if !group.is_empty() {
            r.illnesses(group, &format!("Background illnesses for {label} (PDL1 >= 0.5)"));
        }
    }
}

fn low_pdl1_immuno(r: &mut Report, immuno: &[&PatientProfile]) {
    r.heading(5, "Percentage of 'Immunotherapy Only' patients with PDL1 < 0.5");
    let with_score: Vec<&PatientProfile> = immuno
        .iter()
        .copied()
        .filter(|p| p.pdl1_score.is_some())
        .collect();
    if with_score.is_empty() {
        r.line("No 'Immunotherapy Only' patients with PDL1 score data found.");
        return;
    }
    let low: Vec<&PatientProfile> = with_score
        .iter()
        .copied()
        .filter(|p| p.pdl1_score.is_some_and(|s| s < 0.5))
        .collect();
    r.line(format!(
        "{} of 'Immunotherapy Only' patients with PDL1 data had a PDL1 score < 0.5.",
        count_pct(low.len(), with_score.len(), 2)
    ));
    if !low.is_empty() {
        let weak = low
            .iter()
            .filter(|p| p.performance_status.is_some_and(|ps| ps >= 2))
            .count();
        if weak > 0 {
            r.line(format!(
                "- Of these PDL1 < 0.5 patients: {} have PS >= 2",
                count_pct(weak, low.len(), 1)
            ));
        } else {
            r.line("- No patients with PS >= 2 among PDL1 < 0.5 immunotherapy only patients");
        }
    }
    r.illnesses(&low, "Background illnesses for PDL1 < 0.5 Immunotherapy Only patients");
}

fn pdl1_band(r: &mut Report, all: &[&PatientProfile], n: u8, limit: f64) {
    r.heading(n, &format!("All patients with PDL1 < {limit} - Treatment breakdown"));
    let with_score = all.iter().filter(|p| p.pdl1_score.is_some()).count();
    if with_score == 0 {
        r.line("No patients with PDL1 data found.");
        return;
    }
    let band: Vec<&PatientProfile> = all
        .iter()
        .copied()
        .filter(|p| p.pdl1_score.is_some_and(|s| s < limit))
        .collect();
    if band.is_empty() {
        r.line(format!("No patients with PDL1 < {limit} found."));
        return;
    }
    r.line(format!(
        "Patients with PDL1 < {limit}: {} patients with PDL1 data",
        count_pct(band.len(), with_score, 1)
    ));
    r.breakdown(&band);
    for (label, treatment) in [
        ("Immunotherapy Only", Treatment::ImmunoOnly),
        ("Immunotherapy and Chemotherapy", Treatment::Combo),
    ] {
        let group = treated(&band, treatment);
        if !group.is_empty() {
            r.line(format!("\nReasons for {label} (PDL1 < {limit}):"));
            r.reasons(&group, "- No reasons specified");
        }
    }
}

#[allow(clippy::float_cmp)]
fn dosage_changes(r: &mut Report, combo: &[&PatientProfile]) {
    r.heading(8, "Dosage changes for 'Immunotherapy and Chemotherapy' patients");
    if combo.is_empty() {
        r.line("No patients with 'Immunotherapy and Chemotherapy' treatment found.");
        return;
    }
    r.line(format!(
        "Total 'Immunotherapy and Chemotherapy' patients: {}",
        combo.len()
    ));
    let changed: Vec<&PatientProfile> = combo
        .iter()
        .copied()
        .filter(|p| p.dosage_change.is_some_and(|d| d != 0.0))
        .collect();
    let quantified: Vec<&PatientProfile> = changed
        .iter()
        .copied()
        .filter(|p| p.dosage_change.is_some_and(|d| d != UNQUANTIFIED_CHANGE))
        .collect();
    let unquantified = changed.len() - quantified.len();

    r.line(format!(
        "Patients with any dosage change: {}",
        count_pct(changed.len(), combo.len(), 1)
    ));
    r.line(format!(
        "- Quantifiable dosage changes: {} ({:.1}%)",
        quantified.len(),
        share(quantified.len(), combo.len())
    ));
    r.line(format!(
        "- Unquantifiable dosage changes: {unquantified} ({:.1}%)",
        share(unquantified, combo.len())
    ));

    if !changed.is_empty() {
        let elderly = changed
            .iter()
            .filter(|p| p.age.is_some_and(|a| a >= ELDERLY_AGE))
            .count();
        let younger: Vec<&PatientProfile> = changed
            .iter()
            .copied()
            .filter(|p| p.age.is_some_and(|a| a < ELDERLY_AGE))
            .collect();
        r.line("\nAge-based dosage change analysis:");
        r.line(format!(
            "- Age >= {ELDERLY_AGE}: {} patients who had dosage changes",
            count_pct(elderly, changed.len(), 1)
        ));
        r.line(format!(
            "- Age < {ELDERLY_AGE}: {} patients who had dosage changes",
            count_pct(younger.len(), changed.len(), 1)
        ));
        if !younger.is_empty() {
            r.line(format!(
                "\nReasons for treatment (Age < {ELDERLY_AGE} with dosage changes):"
            ));
            r.reasons(&younger, "- No reasons specified for younger patients with dosage changes");
        }
    }

    if quantified.is_empty() {
        r.line("No patients in this group had a quantifiable dosage change.");
        return;
    }
    let mut per_medication: Vec<(&str, Vec<f64>)> = Vec::new();
    for p in &quantified {
        let Some(change) = p.dosage_change else {
            continue;
        };
        if p.medication.is_empty() || p.medication == "N/A" {
            continue;
        }
        for med in p.medication.split(',').map(str::trim) {
            match per_medication.iter_mut().find(|(m, _)| *m == med) {
                Some((_, changes)) => changes.push(change),
                None => per_medication.push((med, vec![change])),
            }
        }
    }
    if per_medication.is_empty() {
        r.line("No specific medications with quantifiable dosage changes were recorded for this group.");
        return;
    }
    r.line("Average dosage change by medication (for those with quantifiable changes):");
    for (med, changes) in &per_medication {
        r.line(format!(
            "- {med}: {:.2}% (based on {} instance(s) of change)",
            mean(changes),
            changes.len()
        ));
    }
}

fn immuno_illnesses(r: &mut Report, immuno: &[&PatientProfile]) {
    r.heading(9, "Background diseases for 'Immunotherapy Only' patients (by percentage)");
    if immuno.is_empty() {
        r.line("No patients with 'Immunotherapy Only' treatment found for background disease analysis.");
        return;
    }
    let counts = tally(
        immuno
            .iter()
            .flat_map(|p| p.background_illnesses.iter().map(String::as_str)),
    );
    if counts.is_empty() {
        r.line("No background illnesses recorded for 'Immunotherapy Only' patients.");
        return;
    }
    r.line(format!(
        "Background disease prevalence among {} 'Immunotherapy Only' patients:",
        immuno.len()
    ));
    for (illness, count) in counts {
        r.line(format!(
            "- {illness}: {:.2}% ({count} patients)",
            share(count, immuno.len())
        ));
    }
}

fn contrary_reasons(r: &mut Report, immuno: &[&PatientProfile], combo: &[&PatientProfile]) {
    r.heading(10, "Reasons for getting Chemo for patients with high PDL1 (Most common first)");
    if combo.is_empty() {
        r.line("No patients with 'Immunotherapy and Chemotherapy' treatment found.");
    } else {
        let high: Vec<&PatientProfile> = combo
            .iter()
            .copied()
            .filter(|p| p.pdl1_score.is_some_and(|s| s > 0.5))
            .collect();
        r.line("Reasons:");
        r.reasons(&high, "No reasons specified for 'Chemo high pdl1' patients.");
    }

    r.heading(11, "Reasons for getting Immuno for patients with Low PDL1 (Most common first)");
    if immuno.is_empty() {
        r.line("No patients with 'Immunotherapy Only' treatment found.");
    } else {
        let low: Vec<&PatientProfile> = immuno
            .iter()
            .copied()
            .filter(|p| p.pdl1_score.is_some_and(|s| s < 0.5))
            .collect();
        r.line("Reasons:");
        r.reasons(&low, "No reasons specified for 'Immuno Only Low pdl1' patients.");
    }

    r.heading(12, "Reasons for getting chemo and immuno (Most common first)");
    if combo.is_empty() {
        r.line("No patients with 'immuno and chemo' treatment found.");
    } else {
        r.line("Reasons:");
        r.reasons(combo, "No reasons specified for 'immuno and chemo' patients.");
    }
}

fn performance_status(r: &mut Report, all: &[&PatientProfile]) {
    let total = all.len();
    let with_ps: Vec<&PatientProfile> = all
        .iter()
        .copied()
        .filter(|p| p.performance_status.is_some())
        .collect();

    r.heading(13, "Patients with Performance Status >= 2");
    if with_ps.is_empty() {
        r.line("No patients with Performance Status data found.");
    } else {
        let weak = ps_group(&with_ps, 2..=4);
        if weak.is_empty() {
            r.line("No patients with PS >= 2 found.");
        } else {
            r.line(format!(
                "Patients with PS >= 2: {} total patients",
                count_pct(weak.len(), total, 1)
            ));
            r.breakdown(&weak);
        }
    }

    r.heading(14, "Performance Status detailed breakdown");
    if with_ps.is_empty() {
        r.line("No patients with Performance Status data found.");
        return;
    }
    r.line(format!("Total patients with PS data: {}", with_ps.len()));
    for (label, range) in [("0-1", 0..=1), ("2", 2..=2), ("3-4", 3..=4)] {
        let group = ps_group(&with_ps, range);
        r.line(format!(
            "\nPS {label}: {} total patients",
            count_pct(group.len(), total, 1)
        ));
        if !group.is_empty() {
            r.breakdown(&group);
        }
    }
}

fn ps_group<'a>(
    patients: &[&'a PatientProfile],
    range: std::ops::RangeInclusive<u8>,
) -> Vec<&'a PatientProfile> {
    patients
        .iter()
        .copied()
        .filter(|p| p.performance_status.is_some_and(|ps| range.contains(&ps)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::super::classify::{COMBO, IMMUNO_ONLY, PARSE_FAILED_MARK};
    use super::*;

    fn patient(treatment: &str) -> PatientProfile {
        PatientProfile {
            treatment_type: treatment.into(),
            reason: "Not Specified".into(),
            ..PatientProfile::marked("x")
        }
    }

    fn cohort() -> Vec<PatientProfile> {
        vec![
            PatientProfile {
                age: Some(70),
                pdl1_score: Some(0.8),
                reason: "High PD-L1".into(),
                background_illnesses: vec!["Hypertension".into()],
                performance_status: Some(1),
                ..patient(IMMUNO_ONLY)
            },
            PatientProfile {
                age: Some(81),
                pdl1_score: Some(0.3),
                reason: "Frail".into(),
                background_illnesses: vec!["Hypertension".into(), "COPD".into()],
                performance_status: Some(2),
                ..patient(IMMUNO_ONLY)
            },
            PatientProfile {
                age: Some(60),
                pdl1_score: Some(0.005),
                dosage_change: Some(-20.0),
                medication: "Carboplatin, Pemetrexed".into(),
                reason: "PD-L1 negative".into(),
                performance_status: Some(0),
                ..patient(COMBO)
            },
            PatientProfile {
                age: Some(77),
                pdl1_score: Some(0.6),
                dosage_change: Some(-1.0),
                medication: "Carboplatin".into(),
                reason: "High burden".into(),
                performance_status: Some(3),
                ..patient(COMBO)
            },
            PatientProfile::marked(PARSE_FAILED_MARK),
        ]
    }

    #[test]
    fn count_pct_formats() {
        assert_eq!(count_pct(1, 3, 1), "1 out of 3 (33.3%)");
        assert_eq!(count_pct(1, 3, 2), "1 out of 3 (33.33%)");
        assert_eq!(count_pct(0, 0, 2), "0 out of 0 (0.0%)");
    }

    #[test]
    fn empty_cohort() {
        let report = render_report(&[]);
        assert!(report.contains("No patients to analyze."));
        assert!(!report.contains("Analysis 1"));
    }

    #[test]
    fn headline_counts_and_average_age() {
        let report = render_report(&cohort());
        assert!(report.contains("Total Patients: 5\n"));
        assert!(report.contains("Immuno Only Patients: 2 (40.0%)"));
        assert!(report.contains("Combo Patients: 2 (40.0%)"));
        assert!(report.contains("Average age: 75.50 years (based on 2 patients)"));
    }

    #[test]
    fn pdl1_sections() {
        let report = render_report(&cohort());
        assert!(report.contains("Total patients with PDL1 >= 0.5: 2"));
        assert!(report.contains(
            "1 out of 2 (50.00%) of 'Immunotherapy Only' patients with PDL1 data had a PDL1 score < 0.5."
        ));
        assert!(report.contains("- Of these PDL1 < 0.5 patients: 1 out of 1 (100.0%) have PS >= 2"));
        assert!(report.contains("Patients with PDL1 < 0.5: 2 out of 4 (50.0%) patients with PDL1 data"));
        assert!(report.contains("Patients with PDL1 < 0.01: 1 out of 4 (25.0%) patients with PDL1 data"));
        assert!(report.contains("- \"High burden\": 1 occurrences"));
    }

    #[test]
    fn dosage_section() {
        let report = render_report(&cohort());
        assert!(report.contains("Patients with any dosage change: 2 out of 2 (100.0%)"));
        assert!(report.contains("- Quantifiable dosage changes: 1 (50.0%)"));
        assert!(report.contains("- Unquantifiable dosage changes: 1 (50.0%)"));
        assert!(report.contains("- Age >= 75: 1 out of 2 (50.0%) patients who had dosage changes"));
        assert!(report.contains("- Carboplatin: -20.00% (based on 1 instance(s) of change)"));
        assert!(report.contains("- Pemetrexed: -20.00%"));
    }

    #[test]
    fn illness_prevalence_and_performance_status() {
        let report = render_report(&cohort());
        assert!(report.contains("- Hypertension: 100.00% (2 patients)\n- COPD: 50.00% (1 patients)"));
        assert!(report.contains("Patients with PS >= 2: 2 out of 5 (40.0%) total patients"));
        assert!(report.contains("\nPS 0-1: 2 out of 5 (40.0%) total patients"));
        assert!(report.contains("\nPS 2: 1 out of 5 (20.0%) total patients"));
        assert!(report.contains("\nPS 3-4: 1 out of 5 (20.0%) total patients"));
        let pos = report.find("Analysis 14").unwrap();
        assert!(report[pos..].contains("Total patients with PS data: 4"));
    }

    #[test]
    fn all_fourteen_sections_are_present() {
        let report = render_report(&cohort());
        for n in 1..=14 {
            assert!(report.contains(&format!("--- Analysis {n}:")), "missing analysis {n}");
        }
        assert!(report.ends_with("--- End of Analyses ---\n"));
    }
}
