//! # 物理量选择
//!
//! 根据请求的物理量列表和注册表，决定本次实际解析哪些物理量。
//! 对无法解析的物理量给出诊断：缺少哪些文件，以及其中哪些根本不在
//! 作业的取回列表中。
//!
//! ## 依赖关系
//! - 被 `parsers/vasp.rs` 使用
//! - 使用 `parsers/quantity.rs`

use super::quantity::ParsableQuantities;
use glob::Pattern;
use tracing::{debug, warn};

/// 作业配置的取回列表
pub trait RetrieveLists {
    fn retrieve_list(&self) -> Vec<String>;

    fn retrieve_temporary_list(&self) -> Vec<String> {
        Vec::new()
    }
}

/// 物理量选择诊断
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuantityDiagnostic {
    /// 注册表中不存在
    Unknown { quantity: String },
    /// 所有等价物理量都不可解析
    MissingFiles {
        quantity: String,
        missing: Vec<String>,
        /// 缺失且不在取回列表中的文件
        not_retrieved: Vec<String>,
    },
}

/// 物理量选择结果
#[derive(Debug, Clone, Default)]
pub struct ParserManager {
    quantities_to_parse: Vec<String>,
    diagnostics: Vec<QuantityDiagnostic>,
}

impl ParserManager {
    /// 对每个请求的物理量，选出自身或第一个可解析的等价物理量
    pub fn setup(requested: &[String], registry: &ParsableQuantities, job: &dyn RetrieveLists) -> Self {
        let mut manager = ParserManager::default();

        for quantity in requested {
            if !registry.contains(quantity) {
                warn!(
                    "{} has been requested, however its parser has not been implemented. \
                     Please check the docstrings in the file parsers for valid quantities.",
                    quantity
                );
                manager.diagnostics.push(QuantityDiagnostic::Unknown {
                    quantity: quantity.clone(),
                });
                continue;
            }

            let equivalents = registry.equivalents(quantity);
            if let Some(chosen) = equivalents.iter().find(|q| q.is_parsable) {
                debug!("Quantity {} will be parsed as {}", quantity, chosen.original_name);
                if !manager.quantities_to_parse.contains(&chosen.original_name) {
                    manager.quantities_to_parse.push(chosen.original_name.clone());
                }
                continue;
            }

            let mut missing: Vec<String> = Vec::new();
            for q in &equivalents {
                let prerequisite_files = q
                    .prerequisites
                    .iter()
                    .filter_map(|p| registry.get(p))
                    .flat_map(|p| p.missing_files.iter());
                for file in q.missing_files.iter().chain(prerequisite_files) {
                    if !missing.contains(file) {
                        missing.push(file.clone());
                    }
                }
            }

            let scheduled: Vec<String> = job
                .retrieve_list()
                .into_iter()
                .chain(job.retrieve_temporary_list())
                .collect();
            let not_retrieved: Vec<String> = missing
                .iter()
                .filter(|file| !scheduled.iter().any(|entry| retrieve_entry_matches(entry, file)))
                .cloned()
                .collect();

            warn!(
                "{} has been requested, however the following files required for parsing have not been retrieved: {}",
                quantity,
                missing.join(", ")
            );
            if !not_retrieved.is_empty() {
                warn!(
                    "The following files were not in the retrieve list: {}. \
                     Add them to ADDITIONAL_RETRIEVE_LIST to parse {}.",
                    not_retrieved.join(", "),
                    quantity
                );
            }

            manager.diagnostics.push(QuantityDiagnostic::MissingFiles {
                quantity: quantity.clone(),
                missing,
                not_retrieved,
            });
        }

        manager
    }

    /// 实际要解析的物理量（按原始名）
    pub fn quantities_to_parse(&self) -> &[String] {
        &self.quantities_to_parse
    }

    pub fn diagnostics(&self) -> &[QuantityDiagnostic] {
        &self.diagnostics
    }
}

/// 取回列表项可以是通配符，如 `wannier90*`
fn retrieve_entry_matches(entry: &str, file: &str) -> bool {
    match Pattern::new(entry) {
        Ok(pattern) => pattern.matches(file),
        Err(_) => entry == file,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::file_parsers::{ParserDefinition, ParserKind};

    struct Job(Vec<String>);

    impl RetrieveLists for Job {
        fn retrieve_list(&self) -> Vec<String> {
            self.0.clone()
        }
    }

    fn registry(retrieved: &[&str]) -> ParsableQuantities {
        let defs = vec![
            ParserDefinition::new("OUTCAR", ParserKind::Outcar, true),
            ParserDefinition::new("CONTCAR", ParserKind::Poscar, false),
            ParserDefinition::new("IBZKPT", ParserKind::Kpoints, false),
            ParserDefinition::new("EIGENVAL", ParserKind::Eigenval, false),
        ];
        let retrieved: Vec<String> = retrieved.iter().map(|s| s.to_string()).collect();
        ParsableQuantities::setup(&retrieved, &defs).unwrap()
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_unknown_quantity_is_excluded_with_diagnostic() {
        let registry = registry(&["OUTCAR"]);
        let job = Job(names(&["OUTCAR"]));
        let manager = ParserManager::setup(&names(&["total_energies", "not_a_quantity"]), &registry, &job);

        assert_eq!(manager.quantities_to_parse(), &["total_energies".to_string()]);
        assert_eq!(
            manager.diagnostics(),
            &[QuantityDiagnostic::Unknown {
                quantity: "not_a_quantity".into()
            }]
        );
    }

    #[test]
    fn test_first_parsable_equivalent_is_chosen() {
        let registry = registry(&["OUTCAR", "IBZKPT", "EIGENVAL"]);
        let job = Job(Vec::new());
        let manager = ParserManager::setup(&names(&["kpoints", "structure"]), &registry, &job);
        assert_eq!(manager.quantities_to_parse(), &["kpoints-kpoints".to_string()]);

        let registry = self::registry(&["OUTCAR", "EIGENVAL"]);
        let manager = ParserManager::setup(&names(&["kpoints"]), &registry, &job);
        assert_eq!(manager.quantities_to_parse(), &["eigenval-kpoints".to_string()]);
    }

    #[test]
    fn test_missing_files_reports_unscheduled_retrievals() {
        let registry = registry(&["OUTCAR"]);
        let job = Job(names(&["OUTCAR", "CONTCAR", "EIGEN*"]));
        let manager = ParserManager::setup(&names(&["kpoints", "structure"]), &registry, &job);

        assert!(manager.quantities_to_parse().is_empty());
        assert_eq!(
            manager.diagnostics()[0],
            QuantityDiagnostic::MissingFiles {
                quantity: "kpoints".into(),
                missing: names(&["IBZKPT", "EIGENVAL"]),
                not_retrieved: names(&["IBZKPT"]),
            }
        );
        assert_eq!(
            manager.diagnostics()[1],
            QuantityDiagnostic::MissingFiles {
                quantity: "structure".into(),
                missing: names(&["CONTCAR"]),
                not_retrieved: Vec::new(),
            }
        );
    }
}
