//! Financial analysis reports assembled from a fixed series of questions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::Error;
use crate::policy::RetryPolicy;
use crate::service::RagService;

/// Body of a section whose question could not be answered
pub const NO_ANALYSIS: &str = "No analysis available for this section.";

/// Report template
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "snake_case")]
pub enum AnalysisType {
    #[default]
    Comprehensive,
    Profitability,
    Liquidity,
    Efficiency,
}

/// Template listing entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportTemplate {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
}

impl AnalysisType {
    pub const ALL: [AnalysisType; 4] = [
        AnalysisType::Comprehensive,
        AnalysisType::Profitability,
        AnalysisType::Liquidity,
        AnalysisType::Efficiency,
    ];

    pub fn id(self) -> &'static str {
        match self {
            Self::Comprehensive => "comprehensive",
            Self::Profitability => "profitability",
            Self::Liquidity => "liquidity",
            Self::Efficiency => "efficiency",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Comprehensive => "Comprehensive financial analysis",
            Self::Profitability => "Profitability analysis",
            Self::Liquidity => "Liquidity analysis",
            Self::Efficiency => "Operating efficiency analysis",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::Comprehensive => {
                "Overall financial position: profitability, solvency, operations, growth and risk"
            }
            Self::Profitability => "Earning power and the quality of earnings",
            Self::Liquidity => "Short-term solvency and liquidity position",
            Self::Efficiency => "How efficiently assets and capital are used",
        }
    }

    /// Ordered `(section title, question)` pairs
    pub fn questions(self) -> &'static [(&'static str, &'static str)] {
        match self {
            Self::Comprehensive => &[
                (
                    "Profitability",
                    "Analyse the company's profitability, including operating revenue, net profit and gross margin.",
                ),
                (
                    "Solvency",
                    "Analyse the company's solvency, including the debt-to-asset ratio, current ratio and quick ratio.",
                ),
                (
                    "Operating capability",
                    "Analyse the company's operating capability, including total asset turnover and receivables turnover.",
                ),
                (
                    "Growth",
                    "Analyse the company's growth, including revenue growth and net profit growth.",
                ),
                (
                    "Financial risk",
                    "Assess the company's financial risk, including cash flow and financial leverage.",
                ),
            ],
            Self::Profitability => &[
                (
                    "Operating revenue",
                    "Analyse the company's operating revenue in detail and how it has changed.",
                ),
                (
                    "Gross margin",
                    "Analyse the company's gross margin level and the reasons it changed.",
                ),
                (
                    "Net profit",
                    "Analyse the company's net profit and the quality of its earnings.",
                ),
                ("Return on equity", "Analyse the company's return on equity."),
            ],
            Self::Liquidity => &[
                (
                    "Current assets",
                    "Analyse the composition and quality of the company's current assets.",
                ),
                (
                    "Current ratio",
                    "Analyse the company's current ratio and short-term debt-paying ability.",
                ),
                ("Cash flow", "Analyse the company's cash flow position."),
                ("Working capital", "Analyse how the company manages its working capital."),
            ],
            Self::Efficiency => &[
                ("Asset turnover", "Analyse how efficiently the company uses its assets."),
                (
                    "Receivables management",
                    "Analyse how the company manages its accounts receivable.",
                ),
                (
                    "Inventory management",
                    "Analyse the efficiency of the company's inventory management.",
                ),
                ("Capital efficiency", "Analyse how efficiently the company uses its capital."),
            ],
        }
    }

    /// All report templates
    pub fn templates() -> Vec<ReportTemplate> {
        Self::ALL
            .iter()
            .map(|t| ReportTemplate {
                id: t.id(),
                name: t.name(),
                description: t.description(),
            })
            .collect()
    }
}

impl fmt::Display for AnalysisType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for AnalysisType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.id().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::InvalidInput(format!("unknown analysis type '{}'", s)))
    }
}

/// One answered (or failed) question of a report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSection {
    pub title: String,
    pub question: String,
    pub body: String,
    pub cited_chunk_ids: Vec<Uuid>,
    pub confidence: f32,
    pub failed: bool,
}

/// A generated report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialReport {
    pub title: String,
    pub company_name: String,
    pub analysis_type: AnalysisType,
    pub generated_at: DateTime<Utc>,
    pub sections: Vec<ReportSection>,
}

impl FinancialReport {
    pub fn failed_sections(&self) -> usize {
        self.sections.iter().filter(|s| s.failed).count()
    }

    pub fn to_markdown(&self) -> String {
        let mut out = format!("# {}\n\n", self.title);
        out.push_str(&format!("**Analysis type**: {}\n", self.analysis_type.name()));
        out.push_str(&format!(
            "**Generated**: {}\n\n---\n\n",
            self.generated_at.format("%Y-%m-%d %H:%M:%S")
        ));

        for section in &self.sections {
            out.push_str(&format!("## {}\n\n{}\n\n", section.title, section.body.trim()));
        }
        out
    }
}

/// Asks a template's questions in order and assembles the answers
pub struct ReportGenerator<'a> {
    service: &'a RagService,
    retry: RetryPolicy,
    top_k: Option<usize>,
}

impl<'a> ReportGenerator<'a> {
    pub fn new(service: &'a RagService) -> Self {
        Self {
            service,
            retry: RetryPolicy::none(),
            top_k: None,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    /// Generate a report. A section that fails is marked as such and the report
    /// continues with the next question.
    pub async fn generate(
        &self,
        analysis_type: AnalysisType,
        company_name: &str,
        progress: Option<&(dyn Fn(usize, usize) + Send + Sync)>,
    ) -> FinancialReport {
        let questions = analysis_type.questions();
        let total = questions.len();
        let mut sections = Vec::with_capacity(total);

        tracing::info!(
            "Generating {} report for {} ({} questions)",
            analysis_type,
            company_name,
            total
        );

        for (i, (title, question)) in questions.iter().enumerate() {
            if let Some(progress) = progress {
                progress(i, total);
            }

            let section = match self
                .retry
                .run(|| self.service.ask(question, self.top_k))
                .await
            {
                Ok(answer) => ReportSection {
                    title: title.to_string(),
                    question: question.to_string(),
                    body: answer.text,
                    cited_chunk_ids: answer.cited_chunk_ids,
                    confidence: answer.confidence,
                    failed: false,
                },
                Err(e) => {
                    tracing::warn!("Report section '{}' failed: {}", title, e);
                    ReportSection {
                        title: title.to_string(),
                        question: question.to_string(),
                        body: NO_ANALYSIS.to_string(),
                        cited_chunk_ids: Vec::new(),
                        confidence: 0.0,
                        failed: true,
                    }
                }
            };
            sections.push(section);
        }

        if let Some(progress) = progress {
            progress(total, total);
        }

        FinancialReport {
            title: format!("{} Financial Analysis Report", company_name),
            company_name: company_name.to_string(),
            analysis_type,
            generated_at: Utc::now(),
            sections,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RagConfig;
    use crate::error::Result;
    use crate::providers::{GenerationRequest, HashingEmbedder, LlmProvider};
    use crate::types::Document;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Answers every other question, fails the rest
    struct AlternatingLlm {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LlmProvider for AlternatingLlm {
        async fn complete(&self, _request: &GenerationRequest) -> Result<String> {
            if self.calls.fetch_add(1, Ordering::SeqCst) % 2 == 0 {
                Ok("Cash flow from operations was positive [1].".to_string())
            } else {
                Err(Error::generation("HTTP 500"))
            }
        }

        async fn health_check(&self) -> Result<bool> {
            Ok(true)
        }

        fn name(&self) -> &str {
            "alternating"
        }

        fn model(&self) -> &str {
            "alternating-1"
        }
    }

    #[test]
    fn test_analysis_type_parsing_and_templates() {
        assert_eq!("Liquidity".parse::<AnalysisType>().unwrap(), AnalysisType::Liquidity);
        assert!("solvency".parse::<AnalysisType>().is_err());

        let templates = AnalysisType::templates();
        assert_eq!(templates.len(), 4);
        assert_eq!(templates[0].id, "comprehensive");
        assert_eq!(AnalysisType::Comprehensive.questions().len(), 5);
    }

    #[tokio::test]
    async fn test_failed_sections_do_not_stop_the_report() {
        let mut config = RagConfig::default();
        config.service.min_similarity = -1.0;
        let service = RagService::new(
            config,
            Arc::new(HashingEmbedder::new(256).unwrap()),
            Arc::new(AlternatingLlm {
                calls: AtomicUsize::new(0),
            }),
        )
        .unwrap();
        service
            .ingest(Document::new(
                "annual.txt",
                "The company's cash flow from operations was positive. Current ratio improved to 1.8. \
                 Working capital rose, current assets grew and asset turnover increased.",
            ))
            .await
            .unwrap();

        let seen = parking_lot::Mutex::new(Vec::new());
        let progress = |done: usize, total: usize| seen.lock().push((done, total));
        let report = ReportGenerator::new(&service)
            .generate(AnalysisType::Liquidity, "Acme", Some(&progress))
            .await;

        assert_eq!(report.sections.len(), 4);
        assert!(report.failed_sections() >= 1);
        assert!(report.failed_sections() < 4);
        assert_eq!(seen.lock().last(), Some(&(4, 4)));

        let markdown = report.to_markdown();
        assert!(markdown.starts_with("# Acme Financial Analysis Report"));
        assert!(markdown.contains("## Cash flow"));
        assert!(markdown.contains(NO_ANALYSIS));
    }
}
