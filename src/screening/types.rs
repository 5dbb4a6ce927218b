use serde::Serialize;

pub const IMMEDIATE_CONSULTATION: &str = "Schedule immediate consultation";
pub const ROUTINE_CHECKUP: &str = "Schedule routine check-up in 12 months";
pub const MONITOR_BLOOD_SUGAR: &str = "Monitor blood sugar levels regularly";
pub const HEALTHY_LIFESTYLE: &str = "Maintain a healthy diet and lifestyle";

/// 筛查结论
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DrStage {
    #[serde(rename = "DR Detected")]
    DrDetected,
    #[serde(rename = "No DR Detected")]
    NoDr,
}

impl DrStage {
    pub fn label(self) -> &'static str {
        match self {
            DrStage::DrDetected => "DR Detected",
            DrStage::NoDr => "No DR Detected",
        }
    }
}

/// 由模型原始概率确定性推导出的筛查结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    /// 模型原始输出（无DR类别的概率）
    #[serde(skip)]
    pub probability: f32,
    pub stage: DrStage,
    /// 对所选结论的置信度，保留两位小数
    #[serde(rename = "confidence")]
    pub confidence_percent: f64,
    pub recommendations: Vec<String>,
}

impl PredictionResult {
    /// 解读模型分数
    ///
    /// 模型输出视为"无DR"的概率：低于50%判为DR并反转置信度，
    /// 报告的置信度始终针对所选结论。
    pub fn from_probability(probability: f32) -> Self {
        let confidence = probability as f64 * 100.0;
        let (stage, confidence_percent) = if confidence < 50.0 {
            (DrStage::DrDetected, 100.0 - confidence)
        } else {
            (DrStage::NoDr, confidence)
        };

        let first = match stage {
            DrStage::DrDetected => IMMEDIATE_CONSULTATION,
            DrStage::NoDr => ROUTINE_CHECKUP,
        };

        Self {
            probability,
            stage,
            confidence_percent: round2(confidence_percent),
            recommendations: vec![
                first.to_string(),
                MONITOR_BLOOD_SUGAR.to_string(),
                HEALTHY_LIFESTYLE.to_string(),
            ],
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
