// YAML configuration.
//
// The file is read and validated once at startup; the resulting `Config`
// is never modified afterwards.
use crate::error::{PipelineError, Result};
use crate::types::Field;
use crate::util::normalize_header;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub consolidator: ConsolidatorConfig,
    #[serde(default)]
    pub reporter: ReporterConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConsolidatorConfig {
    pub source_path: PathBuf,
    pub excluded_sheets: BTreeSet<String>,
    /// Normalized source header -> canonical column name.
    pub column_mapping: BTreeMap<String, String>,
    pub final_columns: Vec<Field>,
    #[serde(default = "default_output_sheet")]
    pub output_sheet: String,
    #[serde(default = "default_validation_log")]
    pub validation_log: PathBuf,
    #[serde(default)]
    pub machine_summary_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReporterConfig {
    pub quantity_path: PathBuf,
    /// 0-based row holding the machine headers.
    pub quantity_header_row: usize,
    pub consumption_path: PathBuf,
    pub consumption_header_row: usize,
    pub billing_path: PathBuf,
    pub report_path: PathBuf,
    pub anomalies_path: PathBuf,
    pub global_summary_path: PathBuf,
    pub summary_path: PathBuf,
    pub machines_per_row: usize,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            quantity_path: "prod_quantita.xlsx".into(),
            quantity_header_row: 0,
            consumption_path: "prod_consumo_macchine.xlsx".into(),
            consumption_header_row: 2,
            billing_path: "bollette.xlsx".into(),
            report_path: "report.xlsx".into(),
            anomalies_path: "report_anomalie.xlsx".into(),
            global_summary_path: "report_globale_mensile.xlsx".into(),
            summary_path: "report_summary.json".into(),
            machines_per_row: 3,
        }
    }
}

fn default_output_sheet() -> String {
    "Consolidato".to_string()
}

fn default_validation_log() -> PathBuf {
    "validation_errors.log".into()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| PipelineError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        let mut config: Config = serde_yaml::from_str(text)?;
        config.consolidator.column_mapping = config
            .consolidator
            .column_mapping
            .into_iter()
            .map(|(from, to)| (normalize_header(&from), normalize_header(&to)))
            .collect();
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let c = &self.consolidator;
        if c.final_columns.is_empty() {
            return Err(PipelineError::Config("final_columns is empty".into()));
        }
        if !c.final_columns.contains(&Field::MachineId) {
            return Err(PipelineError::Config(format!(
                "final_columns must include '{}'",
                Field::MachineId.column_name()
            )));
        }
        let mut seen = BTreeSet::new();
        for f in &c.final_columns {
            if !seen.insert(f.column_name()) {
                return Err(PipelineError::Config(format!(
                    "final_columns lists '{}' twice",
                    f.column_name()
                )));
            }
        }
        if c.output_sheet.trim().is_empty() {
            return Err(PipelineError::Config("output_sheet is empty".into()));
        }
        if self.reporter.machines_per_row == 0 {
            return Err(PipelineError::Config(
                "machines_per_row must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
consolidator:
  source_path: "Dati consumi e costi energetici.xlsx"
  excluded_sheets: [Consolidato, Tabelle, ICOPOWER]
  column_mapping:
    "macchina o impianto": macchina
    "ore produzione macchina": ore_produzione
    consumo: consumo_kwh
  final_columns: [anno, mese, macchina, ore_produzione, consumo_kwh]
"#;

    #[test]
    fn loads_minimal_config_with_defaults() {
        let cfg = Config::from_yaml(MINIMAL).unwrap();
        assert_eq!(cfg.consolidator.output_sheet, "Consolidato");
        assert_eq!(cfg.consolidator.final_columns.len(), 5);
        assert_eq!(cfg.reporter.machines_per_row, 3);
        assert_eq!(cfg.reporter.consumption_header_row, 2);
        assert!(cfg.consolidator.excluded_sheets.contains("ICOPOWER"));
    }

    #[test]
    fn shipped_config_is_valid() {
        let cfg = Config::from_yaml(include_str!("../config.yaml")).unwrap();
        assert_eq!(cfg.consolidator.final_columns.len(), 11);
        assert_eq!(cfg.consolidator.final_columns[2], Field::MachineId);
        assert_eq!(cfg.consolidator.column_mapping.len(), 8);
    }

    #[test]
    fn mapping_keys_are_normalized() {
        let cfg = Config::from_yaml(MINIMAL).unwrap();
        let mapping = &cfg.consolidator.column_mapping;
        assert_eq!(
            mapping.get("macchina_o_impianto").map(String::as_str),
            Some("macchina")
        );
        assert_eq!(
            mapping.get("ore_produzione_macchina").map(String::as_str),
            Some("ore_produzione")
        );
    }

    #[test]
    fn missing_required_key_is_fatal() {
        let yaml = "consolidator:\n  source_path: a.xlsx\n  excluded_sheets: []\n  column_mapping: {}\n";
        let err = Config::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, PipelineError::ConfigParse(_)));
        assert!(err.to_string().contains("final_columns"));
    }

    #[test]
    fn unknown_final_column_is_rejected() {
        let yaml = MINIMAL.replace("consumo_kwh]", "consumo_kwh, colore]");
        assert!(matches!(
            Config::from_yaml(&yaml),
            Err(PipelineError::ConfigParse(_))
        ));
    }

    #[test]
    fn final_columns_must_include_machine() {
        let yaml = MINIMAL.replace("[anno, mese, macchina,", "[anno, mese,");
        let err = Config::from_yaml(&yaml).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn zero_machines_per_row_is_rejected() {
        let yaml = format!("{}reporter:\n  machines_per_row: 0\n", MINIMAL);
        assert!(matches!(
            Config::from_yaml(&yaml),
            Err(PipelineError::Config(_))
        ));
    }
}
