//! Named external quality scorers
//!
//! Each scorer is a command template plus the label its score follows on the
//! last line of output. Y-SSIM, RGB-SSIM, MS-SSIM and PSNR-HVS-M compare
//! `.y4m` files; VMAF compares raw `.yuv` files and also needs the frame size.

use std::path::Path;
use thiserror::Error;

use crate::config::{ScorerConfig, ScorersConfig};
use crate::template::{TemplateError, TemplateVars};
use crate::tool::{capture_value, CommandRunner, ToolCommand, ToolError};

/// Error type for a single scorer invocation
#[derive(Debug, Error)]
pub enum ScoreError {
    #[error("scorer template: {0}")]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Tool(#[from] ToolError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScorerId {
    YSsim,
    RgbSsim,
    Msssim,
    PsnrHvsM,
    Vmaf,
}

/// Container a scorer reads its inputs from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceForm {
    Y4m,
    Yuv,
}

impl ScorerId {
    pub const ALL: [ScorerId; 5] = [
        ScorerId::YSsim,
        ScorerId::RgbSsim,
        ScorerId::Msssim,
        ScorerId::PsnrHvsM,
        ScorerId::Vmaf,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ScorerId::YSsim => "y_ssim",
            ScorerId::RgbSsim => "rgb_ssim",
            ScorerId::Msssim => "msssim",
            ScorerId::PsnrHvsM => "psnrhvsm",
            ScorerId::Vmaf => "vmaf",
        }
    }

    pub fn reference_form(&self) -> ReferenceForm {
        match self {
            ScorerId::Vmaf => ReferenceForm::Yuv,
            _ => ReferenceForm::Y4m,
        }
    }

    fn config<'a>(&self, scorers: &'a ScorersConfig) -> &'a ScorerConfig {
        match self {
            ScorerId::YSsim => &scorers.y_ssim,
            ScorerId::RgbSsim => &scorers.rgb_ssim,
            ScorerId::Msssim => &scorers.msssim,
            ScorerId::PsnrHvsM => &scorers.psnrhvsm,
            ScorerId::Vmaf => &scorers.vmaf,
        }
    }
}

/// The five scores of one sweep step
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct QualityScores {
    pub y_ssim: f64,
    pub rgb_ssim: f64,
    pub msssim: f64,
    pub psnrhvsm: f64,
    pub vmaf: f64,
}

impl QualityScores {
    pub fn get(&self, id: ScorerId) -> f64 {
        match id {
            ScorerId::YSsim => self.y_ssim,
            ScorerId::RgbSsim => self.rgb_ssim,
            ScorerId::Msssim => self.msssim,
            ScorerId::PsnrHvsM => self.psnrhvsm,
            ScorerId::Vmaf => self.vmaf,
        }
    }

    pub fn set(&mut self, id: ScorerId, value: f64) {
        match id {
            ScorerId::YSsim => self.y_ssim = value,
            ScorerId::RgbSsim => self.rgb_ssim = value,
            ScorerId::Msssim => self.msssim = value,
            ScorerId::PsnrHvsM => self.psnrhvsm = value,
            ScorerId::Vmaf => self.vmaf = value,
        }
    }
}

/// Reference and distorted files in both forms, plus the frame size
#[derive(Debug, Clone, Copy)]
pub struct ScoreInputs<'a> {
    pub reference_y4m: &'a Path,
    pub distorted_y4m: &'a Path,
    pub reference_yuv: &'a Path,
    pub distorted_yuv: &'a Path,
    pub width: u64,
    pub height: u64,
}

/// A configured scorer
#[derive(Debug, Clone, PartialEq)]
pub struct Scorer {
    pub id: ScorerId,
    pub command: String,
    pub label: String,
}

impl Scorer {
    pub fn command_for(&self, inputs: &ScoreInputs<'_>) -> Result<ToolCommand, TemplateError> {
        let (reference, distorted) = match self.id.reference_form() {
            ReferenceForm::Y4m => (inputs.reference_y4m, inputs.distorted_y4m),
            ReferenceForm::Yuv => (inputs.reference_yuv, inputs.distorted_yuv),
        };
        let vars = TemplateVars::new()
            .with("reference", reference.to_string_lossy())
            .with("distorted", distorted.to_string_lossy())
            .with("width", inputs.width.to_string())
            .with("height", inputs.height.to_string());
        ToolCommand::from_template(&self.command, &vars)
    }

    pub fn score<R: CommandRunner + ?Sized>(
        &self,
        runner: &R,
        inputs: &ScoreInputs<'_>,
    ) -> Result<f64, ScoreError> {
        let cmd = self.command_for(inputs)?;
        Ok(capture_value(runner, &cmd, &self.label)?)
    }
}

/// All five scorers, run in a fixed order
#[derive(Debug, Clone, PartialEq)]
pub struct ScorerSet {
    scorers: Vec<Scorer>,
}

impl ScorerSet {
    pub fn from_config(config: &ScorersConfig) -> Self {
        let scorers = ScorerId::ALL
            .iter()
            .map(|id| {
                let cfg = id.config(config);
                Scorer {
                    id: *id,
                    command: cfg.command.clone(),
                    label: cfg.label.clone(),
                }
            })
            .collect();
        Self { scorers }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Scorer> {
        self.scorers.iter()
    }

    pub fn score_all<R: CommandRunner + ?Sized>(
        &self,
        runner: &R,
        inputs: &ScoreInputs<'_>,
    ) -> Result<QualityScores, ScoreError> {
        let mut scores = QualityScores::default();
        for scorer in &self.scorers {
            scores.set(scorer.id, scorer.score(runner, inputs)?);
        }
        Ok(scores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Canned;

    impl CommandRunner for Canned {
        fn run(&self, _: &ToolCommand) -> Result<(), ToolError> {
            Ok(())
        }

        fn capture(&self, cmd: &ToolCommand) -> Result<String, ToolError> {
            Ok(match cmd.program.as_str() {
                "vmafossexec" => "VMAF score = 88.5\n".to_string(),
                "dump_ssim" if cmd.args.first().map(String::as_str) == Some("-y") => {
                    "Total: 14.2\n".to_string()
                }
                "dump_ssim" => "Total: 13.1\n".to_string(),
                "dump_msssim" => "Total: 20.0\n".to_string(),
                "dump_psnrhvs" => "Total: 40.25\n".to_string(),
                _ => String::new(),
            })
        }
    }

    fn inputs() -> ScoreInputs<'static> {
        ScoreInputs {
            reference_y4m: Path::new("/tmp/ref.y4m"),
            distorted_y4m: Path::new("/tmp/dist.y4m"),
            reference_yuv: Path::new("/tmp/ref.yuv"),
            distorted_yuv: Path::new("/tmp/dist.yuv"),
            width: 640,
            height: 360,
        }
    }

    #[test]
    fn test_default_vmaf_command_uses_yuv_and_dimensions() {
        let set = ScorerSet::from_config(&ScorersConfig::default());
        let vmaf = set.iter().find(|s| s.id == ScorerId::Vmaf).unwrap();
        let cmd = vmaf.command_for(&inputs()).unwrap();
        assert_eq!(
            cmd.to_string(),
            "vmafossexec yuv420p10le 640 360 /tmp/ref.yuv /tmp/dist.yuv vmaf_v0.6.1.pkl"
        );
    }

    #[test]
    fn test_ssim_commands_use_y4m() {
        let set = ScorerSet::from_config(&ScorersConfig::default());
        let yssim = set.iter().find(|s| s.id == ScorerId::YSsim).unwrap();
        let cmd = yssim.command_for(&inputs()).unwrap();
        assert_eq!(cmd.args, vec!["-y", "/tmp/ref.y4m", "/tmp/dist.y4m"]);
    }

    #[test]
    fn test_score_all_fills_every_field() {
        let set = ScorerSet::from_config(&ScorersConfig::default());
        let scores = set.score_all(&Canned, &inputs()).unwrap();
        assert_eq!(
            scores,
            QualityScores {
                y_ssim: 14.2,
                rgb_ssim: 13.1,
                msssim: 20.0,
                psnrhvsm: 40.25,
                vmaf: 88.5,
            }
        );
    }

    #[test]
    fn test_bad_scorer_template_is_template_error() {
        let mut config = ScorersConfig::default();
        config.msssim.command = "dump_msssim $model $reference $distorted".to_string();
        let set = ScorerSet::from_config(&config);
        let err = set.score_all(&Canned, &inputs()).unwrap_err();
        assert!(matches!(err, ScoreError::Template(_)));
    }
}
