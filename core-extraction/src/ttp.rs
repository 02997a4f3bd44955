// =====================================================================================
// File: core-extraction/src/ttp.rs
// Description: ATT&CK technique extraction via keyword dictionary
// =====================================================================================

use std::collections::BTreeSet;

/// Keyword dictionary mapping ATT&CK technique ids to trigger tokens.
/// English tokens plus the Chinese terms that show up in TWCERT prose.
/// First keyword hit wins per technique id.
const TTP_KEYWORDS: &[(&str, &[&str])] = &[
    // Initial Access
    ("T1566.001", &["phishing", "spear phishing", "social engineering", "釣魚", "社交工程"]),
    ("T1566.002", &["phishing link", "malicious link", "惡意連結"]),
    ("T1078", &["credential", "account compromise", "stolen account", "憑證", "帳號盜用"]),
    ("T1190", &["public-facing application", "remote exploit", "exploit public"]),
    // Execution
    ("T1059.001", &["powershell", "command execution", "command line", "命令執行"]),
    ("T1059.003", &["cmd.exe", "windows command shell"]),
    ("T1059.005", &["visual basic", "vbscript"]),
    ("T1203", &["exploitation for client execution", "exploit application"]),
    // Persistence
    ("T1547.001", &["registry run key", "startup item", "boot or logon autostart", "開機啟動"]),
    ("T1543.003", &["windows service", "service creation"]),
    ("T1053.005", &["scheduled task", "task scheduler", "排程任務"]),
    // Privilege Escalation
    ("T1548.002", &["uac bypass", "bypass uac"]),
    // Defense Evasion
    ("T1562.001", &["disable security tool", "disable antivirus", "停用安全工具"]),
    ("T1070.004", &["file deletion", "delete file"]),
    ("T1027", &["obfuscate", "obfuscated", "encoded payload", "混淆"]),
    // Credential Access
    ("T1003.001", &["lsass", "credential dump", "憑證傾印"]),
    ("T1555.003", &["credentials from web browsers", "password store"]),
    ("T1110.001", &["brute force", "password guessing", "暴力破解"]),
    // Discovery
    ("T1083", &["file and directory discovery"]),
    ("T1018", &["remote system discovery"]),
    ("T1082", &["system information discovery"]),
    // Lateral Movement
    ("T1021.001", &["rdp", "remote desktop"]),
    ("T1021.002", &["smb", "admin share"]),
    // Collection
    ("T1005", &["data from local system", "local data collection"]),
    ("T1039", &["network share data"]),
    ("T1114.001", &["local email collection"]),
    // Command and Control
    ("T1071.001", &["web protocol", "http c2", "https c2"]),
    ("T1105", &["ingress tool transfer"]),
    ("T1573.002", &["encrypted channel"]),
    // Exfiltration
    ("T1041", &["exfiltration", "data exfiltration", "資料外洩"]),
    ("T1567.002", &["cloud storage exfiltration"]),
    // Impact
    ("T1486", &["ransomware", "data encrypted for impact", "勒索軟體"]),
    ("T1499.004", &["service stop", "service disruption", "服務停止"]),
];

/// Rule-based ATT&CK technique extractor.
#[derive(Debug, Default, Clone)]
pub struct TtpExtractor;

impl TtpExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract technique ids mentioned in the text, de-duplicated and sorted.
    pub fn extract(&self, text: &str) -> Vec<String> {
        if text.is_empty() {
            return Vec::new();
        }

        let haystack = text.to_lowercase();
        let mut ttps: BTreeSet<&str> = BTreeSet::new();

        for (ttp_id, keywords) in TTP_KEYWORDS {
            for keyword in *keywords {
                if haystack.contains(keyword) {
                    ttps.insert(ttp_id);
                    break;
                }
            }
        }

        ttps.into_iter().map(str::to_string).collect()
    }

    /// Keywords registered for one technique id, for diagnostics.
    pub fn keywords_for(&self, ttp_id: &str) -> &'static [&'static str] {
        TTP_KEYWORDS
            .iter()
            .find(|(id, _)| *id == ttp_id)
            .map(|(_, keywords)| *keywords)
            .unwrap_or(&[])
    }
}
