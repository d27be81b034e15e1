//! Catalog of the LHC analyses a scan was confronted with, and the
//! standard selections built on top of them.

use crate::expr::Expr;
use crate::filter::{CmpOp, Predicate};
use crate::source::Selection;
use pmssm_common::PmssmError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const PICK_PROBABILITY: &str = "PickProbability";
pub const CROSS_SECTION: &str = "xsec_tot_pb";

const BF_FLOOR: f64 = 1e-5;
const COMBINED_BF_FLOOR: f64 = 1e-20;

// analyses whose log-likelihoods enter the combinations
const COMBINED_LLHD: [&str; 3] = ["cms_sus_19_006", "atlas_susy_2018_32", "atlas_susy_2018_06"];
const COMBINED_BF: [&str; 2] = ["cms_sus_21_006", "cms_sus_18_004"];
const SIMPLIFIED_LLHD: [&str; 5] =
    ["cms_sus_19_006", "atlas_susy_2018_32", "atlas_susy_2018_06", "cms_sus_21_006", "cms_sus_18_004"];

/// Signal cross-section hypothesis: nominal, halved, or scaled by 1.5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalStrength {
    Nominal,
    Down,
    Up,
}

impl SignalStrength {
    pub const ALL: [SignalStrength; 3] = [SignalStrength::Nominal, SignalStrength::Up, SignalStrength::Down];

    fn llhd_suffix(self) -> &'static str {
        match self {
            SignalStrength::Nominal => "100s",
            SignalStrength::Down => "050s",
            SignalStrength::Up => "150s",
        }
    }

    fn mu_suffix(self) -> &'static str {
        match self {
            SignalStrength::Nominal => "mu1p0f",
            SignalStrength::Down => "mu0p5f",
            SignalStrength::Up => "mu1p5f",
        }
    }

    fn z_suffix(self) -> &'static str {
        match self {
            SignalStrength::Nominal => "",
            SignalStrength::Down => "_05s",
            SignalStrength::Up => "_15s",
        }
    }

    /// Name suffix for histograms built under this hypothesis.
    pub fn tag(self) -> &'static str {
        match self {
            SignalStrength::Nominal => "",
            SignalStrength::Down => "_down",
            SignalStrength::Up => "_up",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Analysis {
    #[serde(rename = "cms_sus_19_006")]
    CmsSus19006,
    #[serde(rename = "cms_sus_18_004")]
    CmsSus18004,
    #[serde(rename = "cms_sus_18_004_simplified")]
    CmsSus18004Simplified,
    #[serde(rename = "cms_sus_21_006")]
    CmsSus21006,
    #[serde(rename = "cms_sus_21_006_simplified")]
    CmsSus21006Simplified,
    #[serde(rename = "cms_sus_21_007")]
    CmsSus21007,
    #[serde(rename = "cms_sus_21_007_simplified")]
    CmsSus21007Simplified,
    #[serde(rename = "atlas_susy_2018_32")]
    AtlasSusy201832,
    #[serde(rename = "atlas_susy_2018_06")]
    AtlasSusy201806,
    #[default]
    #[serde(rename = "combined")]
    Combined,
    #[serde(rename = "combined_simplified")]
    CombinedSimplified,
}

impl Analysis {
    pub const ALL: [Analysis; 11] = [
        Analysis::CmsSus19006,
        Analysis::CmsSus18004,
        Analysis::CmsSus18004Simplified,
        Analysis::CmsSus21006,
        Analysis::CmsSus21006Simplified,
        Analysis::CmsSus21007,
        Analysis::CmsSus21007Simplified,
        Analysis::AtlasSusy201832,
        Analysis::AtlasSusy201806,
        Analysis::Combined,
        Analysis::CombinedSimplified,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Analysis::CmsSus19006 => "cms_sus_19_006",
            Analysis::CmsSus18004 => "cms_sus_18_004",
            Analysis::CmsSus18004Simplified => "cms_sus_18_004_simplified",
            Analysis::CmsSus21006 => "cms_sus_21_006",
            Analysis::CmsSus21006Simplified => "cms_sus_21_006_simplified",
            Analysis::CmsSus21007 => "cms_sus_21_007",
            Analysis::CmsSus21007Simplified => "cms_sus_21_007_simplified",
            Analysis::AtlasSusy201832 => "atlas_susy_2018_32",
            Analysis::AtlasSusy201806 => "atlas_susy_2018_06",
            Analysis::Combined => "combined",
            Analysis::CombinedSimplified => "combined_simplified",
        }
    }

    /// Branch prefix shared by an analysis and its simplified-model variant.
    fn base(self) -> &'static str {
        let name = self.name();
        name.strip_suffix("_simplified").unwrap_or(name)
    }

    pub fn is_simplified(self) -> bool {
        matches!(
            self,
            Analysis::CmsSus18004Simplified
                | Analysis::CmsSus21006Simplified
                | Analysis::CmsSus21007Simplified
                | Analysis::CombinedSimplified
        )
    }

    // full-model results stored as a Bayes factor per signal strength
    fn stores_bayes_factor(self) -> bool {
        matches!(self, Analysis::CmsSus18004 | Analysis::CmsSus21006)
    }

    /// Bayes factor of a point under the given signal hypothesis.
    pub fn bayes_factor(self, strength: SignalStrength) -> Expr {
        match self {
            Analysis::Combined => {
                let s = strength.llhd_suffix();
                let signal = Expr::sum(COMBINED_LLHD.iter().map(|a| llhd(a, s)));
                let background = Expr::sum(COMBINED_LLHD.iter().map(|a| llhd(a, "0s")));
                let stored = COMBINED_BF
                    .iter()
                    .map(|a| Expr::col(format!("bf_{a}_{}", strength.mu_suffix())).max(Expr::lit(COMBINED_BF_FLOOR)));
                Expr::product(std::iter::once((signal - background).exp()).chain(stored))
            }
            Analysis::CombinedSimplified => {
                let s = strength.llhd_suffix();
                let signal = Expr::sum(SIMPLIFIED_LLHD.iter().map(|a| llhd(a, s)));
                let background = Expr::sum(SIMPLIFIED_LLHD.iter().map(|a| llhd(a, "0s")));
                (signal - background).exp()
            }
            a if a.stores_bayes_factor() => {
                Expr::col(format!("bf_{}_{}", a.base(), strength.mu_suffix())).max(Expr::lit(BF_FLOOR))
            }
            a => (llhd(a.base(), strength.llhd_suffix()) - llhd(a.base(), "0s")).exp(),
        }
    }

    /// Significance column used for the survival cut, if the dataset has one.
    pub fn z_branch(self, strength: SignalStrength) -> Option<String> {
        match self {
            Analysis::CombinedSimplified => {
                (strength == SignalStrength::Nominal).then(|| "Zsig_combined_simplified".to_string())
            }
            a if a.stores_bayes_factor() => Some(format!("Zsig_{}_{}", a.base(), strength.mu_suffix())),
            a => Some(format!("Zsig_{}{}", a.base(), strength.z_suffix())),
        }
    }

    /// Points with significance above `z_threshold` are not excluded.
    pub fn survives(self, strength: SignalStrength, z_threshold: f64) -> Option<Predicate> {
        self.z_branch(strength).map(|z| Predicate::gt(Expr::col(z), z_threshold))
    }

    /// Prior selection: sampling reweight plus the sanity cut matching this analysis.
    pub fn base_selection(self) -> Selection {
        Selection::new(reason(self.is_simplified()), reweight())
    }

    /// Posterior density: the base selection weighted by the nominal Bayes factor.
    pub fn posterior_selection(self) -> Selection {
        self.base_selection().weighted_by(self.bayes_factor(SignalStrength::Nominal))
    }
}

fn llhd(analysis: &str, suffix: &str) -> Expr {
    Expr::col(format!("llhd_{analysis}_{suffix}"))
}

/// Undo the sampling bias of the scan.
pub fn reweight() -> Expr {
    Expr::lit(1.0) / Expr::col(PICK_PROBABILITY)
}

/// Drop points with huge cross sections that were never excluded, which
/// only happens through their enormous weights.
pub fn reason(simplified: bool) -> Predicate {
    let z = if simplified { "Zsig_combined_simplified" } else { "Zsig_combined" };
    !Predicate::gt(Expr::col(CROSS_SECTION), 1e3).and(Predicate::eq(Expr::col(z), 0.0))
}

impl fmt::Display for Analysis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Analysis {
    type Err = PmssmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase().replace('-', "_");
        Analysis::ALL
            .into_iter()
            .find(|a| a.name() == key)
            .ok_or_else(|| PmssmError::UnknownAnalysis(s.to_string()))
    }
}

/// Neutralino content of the lightest neutralino.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Composition {
    PureBino,
    PureWino,
    PureHiggsino,
    BinoWino,
    /// bino-wino mixture with the higgsino content smallest
    BinoWinoLightHiggsino,
    BinoHiggsino,
    WinoHiggsino,
}

const PURE_CONTENT: f64 = 0.95;

fn bino() -> Expr {
    Expr::col("Re_N_11").powf(2.0)
}

fn wino() -> Expr {
    Expr::col("Re_N_12").powf(2.0)
}

fn higgsino() -> Expr {
    Expr::col("Re_N_13").powf(2.0) + Expr::col("Re_N_14").powf(2.0)
}

fn greater(a: Expr, b: Expr) -> Predicate {
    Predicate::compare(a, CmpOp::Gt, b)
}

impl Composition {
    pub const ALL: [Composition; 7] = [
        Composition::PureBino,
        Composition::PureWino,
        Composition::PureHiggsino,
        Composition::BinoWino,
        Composition::BinoWinoLightHiggsino,
        Composition::BinoHiggsino,
        Composition::WinoHiggsino,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Composition::PureBino => "pure_bino",
            Composition::PureWino => "pure_wino",
            Composition::PureHiggsino => "pure_higgsino",
            Composition::BinoWino => "bino_wino",
            Composition::BinoWinoLightHiggsino => "bino_wino_light_higgsino",
            Composition::BinoHiggsino => "bino_higgsino",
            Composition::WinoHiggsino => "wino_higgsino",
        }
    }

    pub fn predicate(self) -> Predicate {
        let pure = || {
            Predicate::any([
                Predicate::gt(bino(), PURE_CONTENT),
                Predicate::gt(wino(), PURE_CONTENT),
                Predicate::gt(higgsino(), PURE_CONTENT),
            ])
        };
        match self {
            Composition::PureBino => Predicate::gt(bino(), PURE_CONTENT),
            Composition::PureWino => Predicate::gt(wino(), PURE_CONTENT),
            Composition::PureHiggsino => Predicate::gt(higgsino(), PURE_CONTENT),
            // bino dominant; overlaps the bino-higgsino mixture
            Composition::BinoWino => {
                Predicate::all([!pure(), greater(bino(), higgsino()), greater(bino(), wino())])
            }
            Composition::BinoWinoLightHiggsino => {
                Predicate::all([!pure(), greater(bino(), higgsino()), greater(wino(), higgsino())])
            }
            Composition::BinoHiggsino => {
                Predicate::all([!pure(), greater(bino(), wino()), greater(higgsino(), wino())])
            }
            Composition::WinoHiggsino => {
                Predicate::all([!pure(), greater(wino(), bino()), greater(higgsino(), bino())])
            }
        }
    }
}

impl fmt::Display for Composition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Composition {
    type Err = PmssmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        let key = key.strip_suffix("_mix").unwrap_or(&key);
        Composition::ALL
            .into_iter()
            .find(|c| c.name() == key)
            .ok_or_else(|| PmssmError::Other(format!("unknown composition '{s}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row<'a>(vars: &'a [(&'a str, f64)]) -> impl Fn(&str) -> Option<f64> + 'a {
        move |c| vars.iter().find(|(n, _)| *n == c).map(|(_, v)| *v)
    }

    #[test]
    fn names_round_trip() {
        for a in Analysis::ALL {
            assert_eq!(a.name().parse::<Analysis>().unwrap(), a);
        }
        assert_eq!("CMS-SUS-19-006".parse::<Analysis>().unwrap(), Analysis::CmsSus19006);
        assert!(matches!("cms_sus_99_999".parse::<Analysis>(), Err(PmssmError::UnknownAnalysis(_))));
    }

    #[test]
    fn likelihood_bayes_factor() {
        let bf = Analysis::CmsSus19006.bayes_factor(SignalStrength::Up);
        assert_eq!(bf.columns(), vec!["llhd_cms_sus_19_006_150s", "llhd_cms_sus_19_006_0s"]);
        let v = bf.eval_with(&row(&[("llhd_cms_sus_19_006_150s", -1.0), ("llhd_cms_sus_19_006_0s", -3.0)]));
        assert!((v - 2f64.exp()).abs() < 1e-12);
    }

    #[test]
    fn simplified_shares_branches_with_full_model() {
        let bf = Analysis::CmsSus21007Simplified.bayes_factor(SignalStrength::Nominal);
        assert_eq!(bf.columns(), vec!["llhd_cms_sus_21_007_100s", "llhd_cms_sus_21_007_0s"]);
        assert!(Analysis::CmsSus21007Simplified.is_simplified());
        assert!(!Analysis::CmsSus21007.is_simplified());
    }

    #[test]
    fn stored_bayes_factor_is_floored() {
        let bf = Analysis::CmsSus18004.bayes_factor(SignalStrength::Down);
        assert_eq!(bf.columns(), vec!["bf_cms_sus_18_004_mu0p5f"]);
        assert_eq!(bf.eval_with(&row(&[("bf_cms_sus_18_004_mu0p5f", 0.0)])), 1e-5);
        assert_eq!(bf.eval_with(&row(&[("bf_cms_sus_18_004_mu0p5f", 3.0)])), 3.0);
    }

    #[test]
    fn atlas_2018_32_strengths_not_swapped() {
        let up = Analysis::AtlasSusy201832.bayes_factor(SignalStrength::Up);
        assert!(up.columns().contains(&"llhd_atlas_susy_2018_32_150s"));
    }

    #[test]
    fn combined_bayes_factor() {
        let bf = Analysis::Combined.bayes_factor(SignalStrength::Nominal);
        let cols = bf.columns();
        assert_eq!(cols.len(), 8);
        let mut vars: Vec<(&str, f64)> = cols.iter().map(|c| (*c, 0.0)).collect();
        for v in vars.iter_mut() {
            if v.0 == "llhd_cms_sus_19_006_100s" {
                v.1 = 1.0;
            }
            if v.0 == "bf_cms_sus_21_006_mu1p0f" {
                v.1 = 2.0;
            }
        }
        // exp(1) * 2 * max(0, 1e-20)
        let v = bf.eval_with(&row(&vars));
        assert!((v - 1f64.exp() * 2.0 * 1e-20).abs() < 1e-30);
    }

    #[test]
    fn combined_simplified_uses_five_likelihoods() {
        let bf = Analysis::CombinedSimplified.bayes_factor(SignalStrength::Down);
        assert_eq!(bf.columns().len(), 10);
        assert!(bf.columns().iter().all(|c| c.starts_with("llhd_")));
    }

    #[test]
    fn z_branches() {
        assert_eq!(Analysis::Combined.z_branch(SignalStrength::Nominal).unwrap(), "Zsig_combined");
        assert_eq!(Analysis::Combined.z_branch(SignalStrength::Up).unwrap(), "Zsig_combined_15s");
        assert_eq!(Analysis::CmsSus21007Simplified.z_branch(SignalStrength::Down).unwrap(), "Zsig_cms_sus_21_007_05s");
        assert_eq!(Analysis::CmsSus21006.z_branch(SignalStrength::Down).unwrap(), "Zsig_cms_sus_21_006_mu0p5f");
        assert_eq!(Analysis::CmsSus18004.z_branch(SignalStrength::Nominal).unwrap(), "Zsig_cms_sus_18_004_mu1p0f");
        assert_eq!(
            Analysis::CombinedSimplified.z_branch(SignalStrength::Nominal).unwrap(),
            "Zsig_combined_simplified"
        );
        assert_eq!(Analysis::CombinedSimplified.z_branch(SignalStrength::Up), None);
    }

    #[test]
    fn survival_cut_is_strict() {
        let cut = Analysis::Combined.survives(SignalStrength::Nominal, -1.64).unwrap();
        assert!(cut.eval_with(&row(&[("Zsig_combined", 0.0)])));
        assert!(!cut.eval_with(&row(&[("Zsig_combined", -1.64)])));
        assert!(!cut.eval_with(&row(&[("Zsig_combined", -3.0)])));
    }

    #[test]
    fn reason_cut() {
        let r = reason(false);
        assert!(!r.eval_with(&row(&[("xsec_tot_pb", 5e3), ("Zsig_combined", 0.0)])));
        assert!(r.eval_with(&row(&[("xsec_tot_pb", 5e3), ("Zsig_combined", 0.3)])));
        assert!(r.eval_with(&row(&[("xsec_tot_pb", 10.0), ("Zsig_combined", 0.0)])));
        assert_eq!(reason(true).columns(), vec!["xsec_tot_pb", "Zsig_combined_simplified"]);
    }

    #[test]
    fn reweight_inverts_pick_probability() {
        assert_eq!(reweight().eval_with(&row(&[("PickProbability", 0.25)])), 4.0);
    }

    #[test]
    fn compositions() {
        let pure_h = [("Re_N_11", 0.1), ("Re_N_12", 0.1), ("Re_N_13", 0.7), ("Re_N_14", 0.7)];
        assert!(Composition::PureHiggsino.predicate().eval_with(&row(&pure_h)));
        assert!(!Composition::PureBino.predicate().eval_with(&row(&pure_h)));
        assert!(!Composition::WinoHiggsino.predicate().eval_with(&row(&pure_h)));

        // bino^2 = 0.49, wino^2 = 0.36, higgsino = 0.15
        let bw = [("Re_N_11", 0.7), ("Re_N_12", 0.6), ("Re_N_13", 0.3), ("Re_N_14", 0.245)];
        assert!(Composition::BinoWino.predicate().eval_with(&row(&bw)));
        assert!(!Composition::BinoHiggsino.predicate().eval_with(&row(&bw)));
        assert!(!Composition::WinoHiggsino.predicate().eval_with(&row(&bw)));
        assert!(Composition::BinoWinoLightHiggsino.predicate().eval_with(&row(&bw)));
    }

    #[test]
    fn bino_wino_mix_needs_bino_dominance() {
        // bino^2 = 0.6, wino^2 = 0.1, higgsino = 0.3
        let bino_led = [("Re_N_11", 0.6f64.sqrt()), ("Re_N_12", 0.1f64.sqrt()), ("Re_N_13", 0.3f64.sqrt()), ("Re_N_14", 0.0)];
        assert!(Composition::BinoWino.predicate().eval_with(&row(&bino_led)));
        assert!(!Composition::BinoWinoLightHiggsino.predicate().eval_with(&row(&bino_led)));
        assert!(Composition::BinoHiggsino.predicate().eval_with(&row(&bino_led)));

        // bino^2 = 0.3, wino^2 = 0.6, higgsino = 0.1: wino leads
        let wino_led = [("Re_N_11", 0.3f64.sqrt()), ("Re_N_12", 0.6f64.sqrt()), ("Re_N_13", 0.1f64.sqrt()), ("Re_N_14", 0.0)];
        assert!(!Composition::BinoWino.predicate().eval_with(&row(&wino_led)));
        assert!(Composition::BinoWinoLightHiggsino.predicate().eval_with(&row(&wino_led)));
    }

    #[test]
    fn composition_names() {
        assert_eq!("pure higgsino".parse::<Composition>().unwrap(), Composition::PureHiggsino);
        assert_eq!("bino-wino mix".parse::<Composition>().unwrap(), Composition::BinoWino);
        assert_eq!("wino_higgsino".parse::<Composition>().unwrap(), Composition::WinoHiggsino);
        assert_eq!(
            "bino_wino_light_higgsino".parse::<Composition>().unwrap(),
            Composition::BinoWinoLightHiggsino
        );
        assert!("gravitino".parse::<Composition>().is_err());
    }
}
