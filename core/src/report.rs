//! Derives a risk score and category breakdown from a set of findings.
//! Pure function over whatever findings the caller hands it — the server
//! passes the Store's recent buffer.

use serde::Serialize;

use crate::finding::Finding;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    High,
    Medium,
}

#[derive(Debug, Clone, Serialize)]
pub struct Category {
    pub name: &'static str,
    pub severity: Severity,
    pub issues: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub risk_score: u64,
    pub categories: Vec<Category>,
}

/// `risk_score = |dangerous_protocol findings| + |traffic_anomaly findings|`.
/// A category is omitted entirely when its issue list would be empty.
pub fn aggregate(findings: &[Finding]) -> Report {
    let dangerous: Vec<&Finding> = findings
        .iter()
        .filter(|f| f.dangerous_protocol == Some(true))
        .collect();
    let anomalous: Vec<&Finding> = findings
        .iter()
        .filter(|f| f.traffic_anomaly == Some(true))
        .collect();

    let risk_score = (dangerous.len() + anomalous.len()) as u64;

    let mut categories = Vec::new();

    let mut protocols: Vec<String> = dangerous
        .iter()
        .map(|f| f.protocol.as_deref().unwrap_or("unknown").to_lowercase())
        .collect();
    protocols.sort();
    protocols.dedup();
    if !protocols.is_empty() {
        categories.push(Category {
            name: "protocols",
            severity: Severity::High,
            issues: protocols,
        });
    }

    let mut sources: Vec<String> = anomalous
        .iter()
        .map(|f| {
            f.src_ip
                .clone()
                .or_else(|| f.src_mac.clone())
                .unwrap_or_else(|| "unknown".to_string())
        })
        .collect();
    sources.sort();
    sources.dedup();
    if !sources.is_empty() {
        categories.push(Category {
            name: "traffic",
            severity: Severity::Medium,
            issues: sources,
        });
    }

    Report {
        risk_score,
        categories,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding(dangerous: Option<bool>, anomaly: Option<bool>, protocol: Option<&str>, src_ip: Option<&str>) -> Finding {
        Finding {
            dangerous_protocol: dangerous,
            traffic_anomaly: anomaly,
            protocol: protocol.map(str::to_string),
            src_ip: src_ip.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn mixed_anomalies_and_unknown_protocol() {
        let findings = vec![
            finding(Some(true), None, Some("ftp"), Some("2.2.2.2")),
            finding(Some(true), None, None, Some("3.3.3.3")),
            finding(Some(false), None, None, Some("1.1.1.1")),
            finding(None, Some(true), None, Some("4.4.4.4")),
        ];
        let report = aggregate(&findings);
        assert_eq!(report.risk_score, 3);
        let protocols = &report.categories.iter().find(|c| c.name == "protocols").unwrap().issues;
        assert_eq!(protocols, &vec!["ftp".to_string(), "unknown".to_string()]);
        let traffic = &report.categories.iter().find(|c| c.name == "traffic").unwrap().issues;
        assert_eq!(traffic, &vec!["4.4.4.4".to_string()]);
    }

    #[test]
    fn empty_category_is_omitted() {
        let findings = vec![finding(Some(false), Some(false), None, Some("1.1.1.1"))];
        let report = aggregate(&findings);
        assert_eq!(report.risk_score, 0);
        assert!(report.categories.is_empty());
    }

    #[test]
    fn dangerous_protocol_scenario_reports_single_category() {
        let findings: Vec<Finding> = (0..5)
            .map(|_| finding(Some(true), None, Some("TELNET"), Some("1.1.1.1")))
            .collect();
        let report = aggregate(&findings);
        assert_eq!(report.risk_score, 5);
        assert_eq!(report.categories.len(), 1);
        assert_eq!(report.categories[0].name, "protocols");
        assert_eq!(report.categories[0].issues, vec!["telnet".to_string()]);
    }
}
