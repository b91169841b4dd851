use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub global: Global,
    #[serde(default)]
    pub api: Api,
    #[serde(default)]
    pub database: Database,
    #[serde(default)]
    pub portal: Portal,
    #[serde(default)]
    pub scanner: Scanner,
    #[serde(default)]
    pub surface: Surface,
    #[serde(default)]
    pub monitor: Monitor,
    #[serde(default)]
    pub logging: Logging,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let cfg: Config = toml::from_str(&raw).with_context(|| "parsing TOML")?;
        Ok(cfg)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Global {
    /// Submit the job identifier after the last lot of the final phase.
    pub auto_submit_identifier: bool,
    pub job_delay_seconds: u64,
    /// Abandon the remaining lots of a job once one lot fails.
    pub stop_job_on_lot_failure: bool,
    pub print_summary: bool,
}
impl Default for Global {
    fn default() -> Self {
        Self {
            auto_submit_identifier: false,
            job_delay_seconds: 2,
            stop_job_on_lot_failure: false,
            print_summary: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Api {
    pub base_url: String,
    pub timeout_seconds: u64,
    pub user_agent: String,
}
impl Default for Api {
    fn default() -> Self {
        Self {
            base_url: "https://hallmarkpro.prosenjittechhub.com/admin/get_report_by_id.php".into(),
            timeout_seconds: 30,
            user_agent: concat!("assay-batch/", env!("CARGO_PKG_VERSION")).into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Database {
    pub path: String,
    pub table: String,
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,
}
impl Default for Database {
    fn default() -> Self {
        Self {
            path: "assay-batch.db".into(),
            table: "job_cards".into(),
            max_attempts: 2,
            retry_backoff_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Portal {
    pub base_url: String,
    pub weighing_path: String,
    pub queue_path: String,
    /// Substring of the current URL that means the session is logged out.
    pub login_marker: String,
    pub lot_picker: String,
    pub settle_ms: u64,
    pub alert_settle_ms: u64,
    pub mirror_cornet_to_check_gold: bool,
    pub actions: PortalActions,
    pub fields: PortalFields,
}
impl Default for Portal {
    fn default() -> Self {
        Self {
            base_url: "https://huid.manakonline.in/MANAK".into(),
            weighing_path: "SamplingweightingDeatils".into(),
            queue_path: "NewArticlesListForFireAssaying".into(),
            login_marker: "eBISLogin".into(),
            lot_picker: "s2id_lotno".into(),
            settle_ms: 3000,
            alert_settle_ms: 1000,
            mirror_cornet_to_check_gold: true,
            actions: Default::default(),
            fields: Default::default(),
        }
    }
}

impl Portal {
    pub fn weighing_url(&self, request_no: &str, job_no: &str) -> String {
        format!(
            "{}/{}?requestNo={}&jobNo={}",
            self.base_url.trim_end_matches('/'),
            self.weighing_path,
            request_no,
            job_no
        )
    }

    pub fn queue_url(&self) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), self.queue_path)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalActions {
    pub save_scrap_weight: String,
    pub save_button_weight: String,
    pub save_initial: String,
    pub save_cornet: String,
    pub submit_identifier: String,
}
impl Default for PortalActions {
    fn default() -> Self {
        Self {
            save_scrap_weight: "savesampleweight".into(),
            save_button_weight: "savebuttonweight".into(),
            save_initial: "chechkgoldM12".into(),
            save_cornet: "savecornetvalues".into(),
            submit_identifier: "submitQM".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalFields {
    pub scrap_weight: String,
    pub button_weight: String,
    pub strip_1: StripFields,
    pub strip_2: StripFields,
    pub check_1: StripFields,
    pub check_2: StripFields,
}
impl Default for PortalFields {
    fn default() -> Self {
        Self {
            scrap_weight: "num_scrap_weight".into(),
            button_weight: "buttonweight".into(),
            strip_1: StripFields::own("M11"),
            strip_2: StripFields::own("M12"),
            check_1: StripFields::check_gold("M11"),
            check_2: StripFields::check_gold("M12"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StripFields {
    pub initial: String,
    pub ag: String,
    pub cu: String,
    pub pb: String,
    pub cornet: String,
}

impl StripFields {
    fn own(slot: &str) -> Self {
        Self {
            initial: format!("num_strip_weight_{slot}"),
            ag: format!("num_silver_weight{slot}"),
            cu: format!("num_copper_weight{slot}"),
            pb: format!("num_lead_weight{slot}"),
            cornet: format!("num_cornet_weight{slot}"),
        }
    }

    fn check_gold(slot: &str) -> Self {
        Self {
            initial: format!("num_strip_weight_gold{slot}"),
            ag: format!("num_silver_weight_gold{slot}"),
            cu: format!("num_copper_weight_gold{slot}"),
            pb: format!("num_lead_weight_gold{slot}"),
            cornet: format!("num_cornet_weight_gold{slot}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Scanner {
    pub completed_pattern: String,
    pub needs_initial_pattern: String,
    pub action_pattern: String,
}
impl Default for Scanner {
    fn default() -> Self {
        Self {
            completed_pattern: "Completed".into(),
            needs_initial_pattern: "Please Fill Initial Values".into(),
            action_pattern: "Fire Assaying".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Surface {
    pub program: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub request_timeout_seconds: u64,
    pub log_stderr: bool,
}
impl Default for Surface {
    fn default() -> Self {
        Self {
            program: "python3".into(),
            args: vec!["scripts/portal_bridge.py".into()],
            env: Default::default(),
            request_timeout_seconds: 60,
            log_stderr: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Monitor {
    pub interval_seconds: u64,
    pub tick_ms: u64,
    /// Run a batch over jobs that become ready during monitoring.
    pub auto_process: bool,
    pub mode: String,
}
impl Default for Monitor {
    fn default() -> Self {
        Self {
            interval_seconds: 60,
            tick_ms: 250,
            auto_process: false,
            mode: "all".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Logging {
    pub level: String,
    pub json: bool,
    pub write_to_file: bool,
    pub file_path: String,
}
impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
            write_to_file: false,
            file_path: "logs/assay-batch.log".into(),
        }
    }
}
