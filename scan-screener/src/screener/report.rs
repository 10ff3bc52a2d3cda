//! Report rendering for screening results.
//!
//! Renders a [`ResultSet`] as:
//! - Markdown (file mirror)
//! - Plain text table (console and text mirror)
//! - JSON
//! - Chat markdown (webhook)
//! - HTML table (email body)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use super::result::ResultSet;

// ============================================================================
// Report Format
// ============================================================================

/// Supported report formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    /// Markdown format (human-readable)
    Markdown,
    /// Plain text table
    Text,
    /// JSON format (machine-readable)
    Json,
    /// Chat webhook markdown
    Chat,
    /// HTML table (email)
    Html,
}

impl ReportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Markdown | Self::Chat => "md",
            Self::Text => "txt",
            Self::Json => "json",
            Self::Html => "html",
        }
    }
}

impl std::fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Markdown => write!(f, "markdown"),
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
            Self::Chat => write!(f, "chat"),
            Self::Html => write!(f, "html"),
        }
    }
}

impl std::str::FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "markdown" | "md" => Ok(Self::Markdown),
            "text" | "txt" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            "chat" | "webhook" => Ok(Self::Chat),
            "html" | "email" => Ok(Self::Html),
            _ => Err(format!("Unknown report format: {}", s)),
        }
    }
}

// ============================================================================
// Screener Report
// ============================================================================

/// Report generator over one result.
pub struct ScreenerReport<'a> {
    result: &'a ResultSet,
}

impl<'a> ScreenerReport<'a> {
    pub fn new(result: &'a ResultSet) -> Self {
        Self { result }
    }

    /// Generate report in the specified format.
    pub fn generate(&self, format: ReportFormat) -> String {
        match format {
            ReportFormat::Markdown => self.to_markdown(),
            ReportFormat::Text => self.to_text(),
            ReportFormat::Json => self.to_json(),
            ReportFormat::Chat => self.to_chat_markdown(),
            ReportFormat::Html => self.to_html(),
        }
    }

    /// Save report next to `path`, adding the format's extension if missing.
    pub fn save_to_file(&self, path: &Path, format: ReportFormat) -> Result<PathBuf> {
        let content = self.generate(format);

        let file_path = if path.extension().is_none() {
            path.with_extension(format.extension())
        } else {
            path.to_path_buf()
        };

        if let Some(parent) = file_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create report directory")?;
        }

        std::fs::write(&file_path, content).context("Failed to write report file")?;

        Ok(file_path)
    }

    fn header_line(&self) -> String {
        format!(
            "{} | {} | v{}",
            self.result.strategy_params.description,
            self.result.screening_time,
            self.result.strategy_version
        )
    }

    fn market_line(&self) -> Option<String> {
        self.result.market.as_ref().map(|m| {
            format!(
                "{} {:.2} ({:+.2}%){}",
                m.name,
                m.price,
                m.change_percent,
                if m.safe { "" } else { " 风控触发" }
            )
        })
    }

    /// Generate markdown report.
    pub fn to_markdown(&self) -> String {
        let r = self.result;
        let mut md = String::new();

        let _ = write!(
            md,
            "# 选股报告 - {}\n\n**扫描ID**: {}\n**时间**: {}\n**耗时**: {:.1}秒\n\n",
            r.profile, r.id, r.screening_time, r.duration_secs
        );

        if let Some(market) = self.market_line() {
            let _ = writeln!(md, "**大盘**: {}\n", market);
        }

        if let Some(reason) = &r.aborted_reason {
            let _ = writeln!(md, "> 策略终止: {}\n", reason);
            return md;
        }

        md.push_str("## 筛选摘要\n\n");
        let _ = writeln!(md, "- **总扫描**: {} 只股票", r.total_scanned);
        let _ = writeln!(md, "- **获取行情**: {} 只", r.total_fetched);
        let _ = writeln!(md, "- **符合条件**: {} 只", r.total_stocks_found);
        let _ = writeln!(md, "- **筛选条件**: {}\n", r.strategy_params.params_summary());

        if !r.stage_stats.is_empty() {
            md.push_str("### 筛选漏斗\n\n");
            md.push_str("| 阶段 | 通过 | 淘汰 | 淘汰率 |\n");
            md.push_str("|------|------|------|--------|\n");
            for fr in &r.stage_stats {
                let _ = writeln!(
                    md,
                    "| {} | {} | {} | {:.1}% |",
                    fr.stage, fr.passed, fr.eliminated, fr.elimination_rate
                );
            }
            md.push('\n');
        }

        md.push_str("## 推荐股票\n\n");
        if r.stocks.is_empty() {
            md.push_str("今日无符合条件的标的。\n\n");
        } else {
            md.push_str("| 排名 | 代码 | 名称 | 现价 | 涨幅% | 评分 | 乖离% | 换手% | 成交额(亿) | 估算市值(亿) |\n");
            md.push_str("|------|------|------|------|-------|------|-------|-------|------------|--------------|\n");
            for (i, c) in r.stocks.iter().enumerate() {
                let _ = writeln!(
                    md,
                    "| {} | {} | {} | {:.2} | {:.2} | {:.1} | {:.2} | {:.2} | {:.2} | {} |",
                    i + 1,
                    c.quote.symbol,
                    c.quote.name,
                    c.quote.price,
                    c.quote.change_percent,
                    c.total_score,
                    c.quote.deviation,
                    c.quote.turnover_rate.unwrap_or(0.0),
                    c.amount_yi,
                    c.estimated_cap
                        .map_or("-".to_string(), |v| format!("{:.1}", v / 1e8)),
                );
            }
            md.push('\n');
        }

        md.push_str("---\n\n");
        md.push_str("*市值为成交额/换手率的估算值，仅供参考*\n");

        md
    }

    /// Fixed-width table for terminals and text files.
    pub fn to_text(&self) -> String {
        let r = self.result;
        let mut out = String::new();
        let rule = "=".repeat(60);

        let _ = writeln!(out, "{}", rule);
        let _ = writeln!(out, "  {}", self.header_line());
        let _ = writeln!(out, "{}", rule);

        if let Some(market) = self.market_line() {
            let _ = writeln!(out, "大盘: {}", market);
        }

        if let Some(reason) = &r.aborted_reason {
            let _ = writeln!(out, "策略终止: {}", reason);
            return out;
        }

        if r.stocks.is_empty() {
            let _ = writeln!(out, "今日无符合条件的标的 (扫描 {} 只)", r.total_scanned);
            return out;
        }

        let _ = writeln!(
            out,
            "推荐 TOP {} (符合条件 {} / 扫描 {})\n",
            r.stocks.len(),
            r.total_stocks_found,
            r.total_scanned
        );

        let header = format!(
            "{:<4} {:<8} {:<10} {:>8} {:>8} {:>6} {:>7} {:>7} {:>10}",
            "排名", "代码", "名称", "现价", "涨幅%", "评分", "乖离%", "换手%", "成交额(亿)"
        );
        let _ = writeln!(out, "{}", header);
        let _ = writeln!(out, "{}", "-".repeat(80));

        for (i, c) in r.stocks.iter().enumerate() {
            let _ = writeln!(
                out,
                "{:<4} {:<8} {:<10} {:>8.2} {:>8.2} {:>6.1} {:>7.2} {:>7.2} {:>10.2}",
                i + 1,
                c.quote.symbol,
                c.quote.name,
                c.quote.price,
                c.quote.change_percent,
                c.total_score,
                c.quote.deviation,
                c.quote.turnover_rate.unwrap_or(0.0),
                c.amount_yi,
            );
        }

        out
    }

    /// Generate JSON report.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self.result).unwrap_or_else(|_| "{}".to_string())
    }

    /// Compact markdown for a chat webhook.
    pub fn to_chat_markdown(&self) -> String {
        let r = self.result;
        let mut msg = String::new();

        let _ = writeln!(msg, "## 📊 {}", r.strategy_params.description);
        let _ = writeln!(msg, "> {}", r.screening_time);
        if let Some(market) = self.market_line() {
            let _ = writeln!(msg, "> 大盘: {}", market);
        }
        msg.push('\n');

        for (i, c) in r.stocks.iter().enumerate() {
            let _ = writeln!(
                msg,
                "{}. **{}** {} 现价 {:.2} 涨幅 <font color=\"warning\">{:+.2}%</font> 评分 {:.1}",
                i + 1,
                c.quote.symbol,
                c.quote.name,
                c.quote.price,
                c.quote.change_percent,
                c.total_score
            );
        }

        let _ = write!(
            msg,
            "\n符合条件 {} 只 / 扫描 {} 只",
            r.total_stocks_found, r.total_scanned
        );

        msg
    }

    /// Plain text notice when nothing was selected.
    pub fn to_chat_text(&self) -> String {
        let r = self.result;
        match &r.aborted_reason {
            Some(reason) => format!("{} {}: 策略终止 ({})", r.screening_time, r.profile, reason),
            None => format!(
                "{} {}: 今日无符合条件的标的 (扫描 {} 只)",
                r.screening_time, r.profile, r.total_scanned
            ),
        }
    }

    /// HTML body for email.
    pub fn to_html(&self) -> String {
        let r = self.result;
        let mut html = String::new();

        let _ = write!(
            html,
            "<html><body><h2>{}</h2><p>{}</p>",
            escape_html(&r.strategy_params.description),
            escape_html(&r.screening_time)
        );

        if let Some(market) = self.market_line() {
            let _ = write!(html, "<p>大盘: {}</p>", escape_html(&market));
        }

        if r.stocks.is_empty() {
            let _ = write!(html, "<p>{}</p>", escape_html(&self.to_chat_text()));
        } else {
            html.push_str(
                "<table border=\"1\" cellpadding=\"4\" cellspacing=\"0\">\
                 <tr><th>排名</th><th>代码</th><th>名称</th><th>现价</th><th>涨幅%</th>\
                 <th>评分</th><th>乖离%</th><th>换手%</th><th>成交额(亿)</th></tr>",
            );
            for (i, c) in r.stocks.iter().enumerate() {
                let _ = write!(
                    html,
                    "<tr><td>{}</td><td>{}</td><td>{}</td><td>{:.2}</td><td>{:.2}</td>\
                     <td>{:.1}</td><td>{:.2}</td><td>{:.2}</td><td>{:.2}</td></tr>",
                    i + 1,
                    escape_html(&c.quote.symbol),
                    escape_html(&c.quote.name),
                    c.quote.price,
                    c.quote.change_percent,
                    c.total_score,
                    c.quote.deviation,
                    c.quote.turnover_rate.unwrap_or(0.0),
                    c.amount_yi,
                );
            }
            html.push_str("</table>");
        }

        html.push_str("<p><small>市值为估算值，仅供参考，不构成投资建议。</small></p></body></html>");
        html
    }
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{MarketQuote, RawQuote};
    use crate::screener::filter::{FilterResult, FilterStage};
    use crate::screener::profile::FilterProfile;
    use crate::screener::result::MarketSnapshot;
    use crate::screener::scorer::Scorer;
    use chrono::Local;
    use tempfile::TempDir;

    fn create_test_result() -> ResultSet {
        let profile = FilterProfile::burial_1450();
        let quote = MarketQuote::from_raw(RawQuote {
            symbol: "000001".into(),
            name: "平安银行".into(),
            price: 11.2,
            open: 11.0,
            high: 11.25,
            low: 10.9,
            pre_close: 11.0,
            volume: 80_000.0,
            amount: 89_600_000.0,
            turnover_rate: Some(4.0),
            volume_ratio: Some(1.3),
            change_percent: Some(1.82),
        });

        let mut result = ResultSet::new(&profile, "2.0", Local::now());
        result.stocks = vec![Scorer::for_profile(&profile).score(&quote, None)];
        result.total_scanned = 4000;
        result.total_stocks_found = 1;
        result.stage_stats = vec![
            FilterResult::new(FilterStage::Price, 4000, 3900),
            FilterResult::new(FilterStage::Change, 3900, 800),
        ];
        result.market = Some(MarketSnapshot {
            code: "000001".into(),
            name: "上证指数".into(),
            price: 3100.0,
            change_percent: 0.35,
            risk_threshold: Some(-0.6),
            safe: true,
        });
        result
    }

    #[test]
    fn test_markdown_generation() {
        let result = create_test_result();
        let md = ScreenerReport::new(&result).to_markdown();

        assert!(md.contains("# 选股报告 - burial-1450"));
        assert!(md.contains("000001"));
        assert!(md.contains("平安银行"));
        assert!(md.contains("筛选漏斗"));
        assert!(md.contains("上证指数"));
    }

    #[test]
    fn test_text_generation() {
        let result = create_test_result();
        let text = ScreenerReport::new(&result).to_text();
        assert!(text.contains("推荐 TOP 1"));
        assert!(text.contains("平安银行"));

        let mut empty = create_test_result();
        empty.stocks.clear();
        empty.total_stocks_found = 0;
        assert!(ScreenerReport::new(&empty).to_text().contains("今日无符合条件"));
    }

    #[test]
    fn test_aborted_report() {
        let mut result = create_test_result();
        result.stocks.clear();
        result.aborted_reason = Some("index change -1.20% below -0.60%".into());

        let report = ScreenerReport::new(&result);
        assert!(report.to_markdown().contains("策略终止"));
        assert!(!report.to_markdown().contains("推荐股票"));
        assert!(report.to_chat_text().contains("策略终止"));
    }

    #[test]
    fn test_chat_and_html() {
        let result = create_test_result();
        let report = ScreenerReport::new(&result);

        let chat = report.to_chat_markdown();
        assert!(chat.starts_with("## 📊"));
        assert!(chat.contains("**000001**"));

        let html = report.to_html();
        assert!(html.contains("<table"));
        assert!(html.contains("平安银行"));
    }

    #[test]
    fn test_json_generation() {
        let result = create_test_result();
        let json = ScreenerReport::new(&result).to_json();
        assert!(json.contains("\"id\""));
        assert!(json.contains("\"stocks\""));
        assert!(json.contains("\"estimated_cap\""));
    }

    #[test]
    fn test_save_to_file_adds_extension() {
        let dir = TempDir::new().unwrap();
        let result = create_test_result();
        let path = ScreenerReport::new(&result)
            .save_to_file(&dir.path().join("report"), ReportFormat::Markdown)
            .unwrap();
        assert_eq!(path.extension().unwrap(), "md");
        assert!(path.exists());
    }

    #[test]
    fn test_report_format_parsing() {
        assert_eq!("markdown".parse::<ReportFormat>().unwrap(), ReportFormat::Markdown);
        assert_eq!("md".parse::<ReportFormat>().unwrap(), ReportFormat::Markdown);
        assert_eq!("txt".parse::<ReportFormat>().unwrap(), ReportFormat::Text);
        assert_eq!("email".parse::<ReportFormat>().unwrap(), ReportFormat::Html);
        assert!("pdf".parse::<ReportFormat>().is_err());
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("<a&b>"), "&lt;a&amp;b&gt;");
    }
}
