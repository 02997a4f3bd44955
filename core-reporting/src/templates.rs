// =====================================================================================
// File: core-reporting/src/templates.rs
// Description: Handlebars templates for tickets, reports and notifications
// =====================================================================================

use crate::{ReportingError, ReportingResult};
use handlebars::Handlebars;
use serde::Serialize;

pub const TICKET_HTML: &str = "ticket_html";
pub const TICKET_TEXT: &str = "ticket_text";
pub const WEEKLY_HTML: &str = "weekly_html";
pub const NOTIFICATION_CRITICAL: &str = "notification_critical";
pub const NOTIFICATION_DIGEST: &str = "notification_digest";
pub const NOTIFICATION_WEEKLY: &str = "notification_weekly";

const TICKET_TEXT_TEMPLATE: &str = "\
{{title}}
Priority: {{priority}}
Status: {{status}}

CVE: {{cve}}
CVSS base score: {{cvss_base_score}}
Final risk score: {{final_risk_score}} ({{risk_level}})

Description:
{{description}}

Affected assets:
{{#each assets}}
- {{hostname}} ({{ip}}) owner={{owner}} os={{operating_system}}
  products: {{products}}
  match: {{match_kind}} confidence={{confidence}}
{{/each}}

Remediation reference: {{remediation_url}}
";

const TICKET_HTML_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>{{title}}</title></head>
<body>
<h1>{{title}}</h1>
<p><strong>Priority:</strong> {{priority}} | <strong>Status:</strong> {{status}}</p>
<p><strong>CVE:</strong> {{cve}} | <strong>CVSS:</strong> {{cvss_base_score}} | <strong>Risk:</strong> {{final_risk_score}} ({{risk_level}})</p>
<h2>Description</h2>
<p>{{description}}</p>
<h2>Affected assets</h2>
<table border="1">
<tr><th>Hostname</th><th>IP</th><th>Owner</th><th>OS</th><th>Products</th><th>Match</th><th>Confidence</th></tr>
{{#each assets}}
<tr><td>{{hostname}}</td><td>{{ip}}</td><td>{{owner}}</td><td>{{operating_system}}</td><td>{{products}}</td><td>{{match_kind}}</td><td>{{confidence}}</td></tr>
{{/each}}
</table>
<p>Remediation reference: <a href="{{remediation_url}}">{{remediation_url}}</a></p>
</body>
</html>
"#;

const WEEKLY_HTML_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>{{title}}</title></head>
<body>
<h1>{{title}}</h1>
<p>Period: {{period_start}} to {{period_end}}</p>
{{#if summary}}
<h2>Executive summary</h2>
<p>{{summary}}</p>
{{/if}}
<h2>Key numbers</h2>
<ul>
<li>Threats ingested: {{total_threats}} ({{threat_delta}} vs previous week)</li>
<li>Critical-risk assessments (score &ge; 8.0): {{critical_assessments}}</li>
<li>Mean risk score: {{mean_risk}} ({{risk_delta}} vs previous week)</li>
<li>Affected assets: {{affected_assets}}</li>
</ul>
<h2>Top threats</h2>
<table border="1">
<tr><th>CVE</th><th>Title</th><th>Severity</th><th>Risk</th><th>Assets</th></tr>
{{#each top_threats}}
<tr><td>{{cve}}</td><td>{{title}}</td><td>{{severity}}</td><td>{{risk_score}}</td><td>{{asset_count}}</td></tr>
{{/each}}
</table>
<h2>Asset exposure</h2>
<ul>
{{#each asset_buckets}}
<li>{{name}}: {{count}}</li>
{{/each}}
</ul>
</body>
</html>
"#;

const NOTIFICATION_CRITICAL_TEMPLATE: &str = "\
A critical risk assessment was completed.

Threat: {{threat_title}}
CVE: {{cve}}
Final risk score: {{final_risk_score}} ({{risk_level}})
Affected assets: {{affected_asset_count}}

Review the associated ticket for remediation details.
";

const NOTIFICATION_DIGEST_TEMPLATE: &str = "\
High-risk assessments for {{date}} (score >= {{threshold}}):

{{#each items}}
- {{threat_title}} [{{cve}}] score={{final_risk_score}} ({{risk_level}}), assets={{affected_asset_count}}
{{/each}}

Total: {{total}} assessment(s).
";

const NOTIFICATION_WEEKLY_TEMPLATE: &str = "\
The weekly CISO report has been generated.

Report: {{title}}
Stored at: {{path}}
Generated: {{generated_at}}
";

/// Registry of embedded templates.
pub struct TemplateEngine {
    registry: Handlebars<'static>,
}

impl TemplateEngine {
    pub fn new() -> ReportingResult<Self> {
        let mut registry = Handlebars::new();
        registry.register_escape_fn(handlebars::html_escape);

        for (name, template) in [
            (TICKET_HTML, TICKET_HTML_TEMPLATE),
            (TICKET_TEXT, TICKET_TEXT_TEMPLATE),
            (WEEKLY_HTML, WEEKLY_HTML_TEMPLATE),
            (NOTIFICATION_CRITICAL, NOTIFICATION_CRITICAL_TEMPLATE),
            (NOTIFICATION_DIGEST, NOTIFICATION_DIGEST_TEMPLATE),
            (NOTIFICATION_WEEKLY, NOTIFICATION_WEEKLY_TEMPLATE),
        ] {
            registry
                .register_template_string(name, template)
                .map_err(|e| ReportingError::Template(format!("{}: {}", name, e)))?;
        }

        Ok(Self { registry })
    }

    pub fn render<T: Serialize>(&self, template: &str, data: &T) -> ReportingResult<String> {
        self.registry
            .render(template, data)
            .map_err(|e| ReportingError::Template(format!("{}: {}", template, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_engine_registers_all_templates() {
        assert!(TemplateEngine::new().is_ok());
    }

    #[test]
    fn test_ticket_text_render() {
        let engine = TemplateEngine::new().unwrap();
        let rendered = engine
            .render(
                TICKET_TEXT,
                &json!({
                    "title": "IT Ticket - CVE-2024-1",
                    "priority": "Medium",
                    "status": "Pending",
                    "cve": "CVE-2024-1",
                    "cvss_base_score": 7.5,
                    "final_risk_score": 7.5,
                    "risk_level": "High",
                    "description": "Example",
                    "remediation_url": "https://nvd.nist.gov/vuln/detail/CVE-2024-1",
                    "assets": [{
                        "hostname": "db-01",
                        "ip": "10.0.0.5",
                        "owner": "dba",
                        "operating_system": "Windows Server 2019",
                        "products": "SQL Server 15.0",
                        "match_kind": "exact_product_no_version",
                        "confidence": 0.7,
                    }],
                }),
            )
            .unwrap();
        assert!(rendered.contains("IT Ticket - CVE-2024-1"));
        assert!(rendered.contains("db-01"));
        assert!(rendered.contains("owner=dba"));
    }

    #[test]
    fn test_weekly_html_render() {
        let engine = TemplateEngine::new().unwrap();
        let rendered = engine
            .render(
                WEEKLY_HTML,
                &json!({
                    "title": "CISO Weekly Report 2024-03-11",
                    "period_start": "2024-03-04 00:00",
                    "period_end": "2024-03-10 23:59",
                    "summary": "All quiet.",
                    "total_threats": 42,
                    "threat_delta": "+5",
                    "critical_assessments": 3,
                    "mean_risk": 5.4,
                    "risk_delta": "-0.2",
                    "affected_assets": 12,
                    "top_threats": [],
                    "asset_buckets": [],
                }),
            )
            .unwrap();
        assert!(rendered.contains("CISO Weekly Report 2024-03-11"));
        assert!(rendered.contains("Threats ingested: 42"));
    }

    #[test]
    fn test_html_is_escaped() {
        let engine = TemplateEngine::new().unwrap();
        let rendered = engine
            .render(
                NOTIFICATION_CRITICAL,
                &json!({
                    "threat_title": "<script>alert(1)</script>",
                    "cve": "CVE-2024-1",
                    "final_risk_score": 9.0,
                    "risk_level": "Critical",
                    "affected_asset_count": 1,
                }),
            )
            .unwrap();
        assert!(!rendered.contains("<script>"));
    }
}
