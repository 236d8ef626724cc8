//! # 输出节点组装
//!
//! 把解析得到的物理量组装成结构化输出节点（dict、结构、数组、轨迹、
//! k 点、能带、二进制文件）。
//!
//! ## 规则
//! - 物理量优先取自身的值，否则取第一个有值的等价物理量，
//!   统一以规范名存入输入表
//! - 找不到值的物理量记录警告后省略，不使用默认值
//! - 未知节点类型直接报错
//!
//! ## 依赖关系
//! - 被 `parsers/vasp.rs`, `commands/compose.rs` 使用
//! - 使用 `parsers/quantity.rs`, `parsers/file_parsers/`, `models/node.rs`

use super::file_parsers::FileParser;
use super::kpoints::kpoints_from_record;
use super::quantity::ParsableQuantities;
use crate::error::{Result, VaspflowError};
use crate::models::{
    ArrayData, ArrayEntry, BandsData, FileBlob, KpointsData, NdArray, NodeType,
    OutputNode, ParsedQuantities, ParsedValue, StructureData, TrajectoryData,
};
use serde_json::Value;
use tracing::warn;

/// 节点组装器：持有注册表和已解析的物理量
#[derive(Debug, Clone, Default)]
pub struct NodeComposer {
    quantities: ParsableQuantities,
    parsed: ParsedQuantities,
}

impl NodeComposer {
    pub fn new(quantities: ParsableQuantities, parsed: ParsedQuantities) -> Self {
        NodeComposer { quantities, parsed }
    }

    /// 直接从单个文件解析器建立组装器
    pub fn from_file_parser(parser: &mut dyn FileParser) -> Result<Self> {
        let quantities = ParsableQuantities::from_items(parser.parsable_items(), None)?;
        let keys: Vec<String> = parser.parsable_items().keys().cloned().collect();

        let mut parsed = ParsedQuantities::new();
        for key in keys {
            if let Some(value) = parser.get_quantity(&key)? {
                parsed.insert(key, value);
            }
        }
        Ok(NodeComposer { quantities, parsed })
    }

    /// 组装节点；`quantity_names` 为 None 时使用该节点类型的默认物理量
    pub fn compose(&self, node_type: &str, quantity_names: Option<&[String]>) -> Result<OutputNode> {
        let node_type: NodeType = node_type.parse()?;
        let names: Vec<String> = match quantity_names {
            Some(names) => names.to_vec(),
            None => node_type
                .required_quantities()
                .iter()
                .map(|s| s.to_string())
                .collect(),
        };
        let inputs = self.collect_quantity_data(&names);
        compose_inputs(node_type, &inputs)
    }

    /// 按规范名收集物理量的值
    pub fn collect_quantity_data(&self, names: &[String]) -> ParsedQuantities {
        let mut inputs = ParsedQuantities::new();

        for name in names {
            let canonical = self
                .quantities
                .get(name)
                .map(|q| q.name.clone())
                .unwrap_or_else(|| name.clone());

            if let Some(value) = self.parsed.get(name) {
                inputs.insert(canonical, value.clone());
                continue;
            }

            // 按声明顺序取第一个有值的等价物理量，与 manager 选取可解析物理量的规则一致
            let equivalent = self
                .quantities
                .get(name)
                .into_iter()
                .flat_map(|q| q.alternatives.iter())
                .find_map(|alt| self.parsed.get(alt));

            match equivalent {
                Some(value) => {
                    inputs.insert(canonical, value.clone());
                }
                None => warn!(
                    "Quantity {} was requested for a node but no value or equivalent was parsed; it is left out",
                    name
                ),
            }
        }

        inputs
    }
}

fn compose_error(node_type: NodeType, reason: impl Into<String>) -> VaspflowError {
    VaspflowError::ComposeError {
        node_type: node_type.tag().to_string(),
        reason: reason.into(),
    }
}

/// 按节点类型组装输入表
pub fn compose_inputs(node_type: NodeType, inputs: &ParsedQuantities) -> Result<OutputNode> {
    match node_type {
        NodeType::Dict => {
            let map = inputs
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect::<serde_json::Map<String, Value>>();
            Ok(OutputNode::Dict(map))
        }
        NodeType::Structure => compose_structure(inputs).map(OutputNode::Structure),
        NodeType::Array => compose_array(inputs).map(OutputNode::Array),
        NodeType::Trajectory => compose_trajectory(inputs).map(OutputNode::Trajectory),
        NodeType::Kpoints => compose_kpoints(inputs).map(OutputNode::Kpoints),
        NodeType::Bands => compose_bands(inputs).map(OutputNode::Bands),
        NodeType::ChargeDensity => compose_blob(node_type, inputs).map(OutputNode::ChargeDensity),
        NodeType::Wavefunction => compose_blob(node_type, inputs).map(OutputNode::Wavefunction),
    }
}

fn compose_structure(inputs: &ParsedQuantities) -> Result<StructureData> {
    let record = match inputs.get("structure") {
        Some(ParsedValue::Structure(record)) => record,
        Some(other) => {
            return Err(compose_error(
                NodeType::Structure,
                format!("'structure' is not a structure record: {:?}", other),
            ))
        }
        None => return Err(compose_error(NodeType::Structure, "missing quantity 'structure'")),
    };

    let mut structure = StructureData::default();
    structure.set_cell(record.unitcell);
    for site in &record.sites {
        structure.append_atom(site.position, &site.symbol, Some(&site.kind_name));
    }
    Ok(structure)
}

fn compose_array(inputs: &ParsedQuantities) -> Result<ArrayData> {
    let mut node = ArrayData::default();
    for (key, value) in inputs {
        match value {
            ParsedValue::Arrays(arrays) => {
                for (name, array) in arrays {
                    node.set_array(name, array.clone());
                }
            }
            ParsedValue::Array(array) => node.set_array(key, ArrayEntry::Numeric(array.clone())),
            _ => {
                return Err(compose_error(
                    NodeType::Array,
                    format!("quantity '{}' is not an array", key),
                ))
            }
        }
    }
    Ok(node)
}

fn compose_trajectory(inputs: &ParsedQuantities) -> Result<TrajectoryData> {
    let mut node = TrajectoryData::default();
    for (key, value) in inputs {
        let ParsedValue::Arrays(arrays) = value else {
            return Err(compose_error(
                NodeType::Trajectory,
                format!("quantity '{}' is not an array table", key),
            ));
        };
        for (name, array) in arrays {
            match (name.as_str(), array) {
                ("symbols", ArrayEntry::Labels(symbols)) => {
                    node.set_attribute("symbols", serde_json::json!(symbols));
                }
                (_, ArrayEntry::Numeric(data)) => node.set_array(name, data.clone()),
                (_, ArrayEntry::Labels(_)) => {
                    return Err(compose_error(
                        NodeType::Trajectory,
                        format!("array '{}' must be numeric", name),
                    ))
                }
            }
        }
    }
    Ok(node)
}

fn compose_kpoints(inputs: &ParsedQuantities) -> Result<KpointsData> {
    let record = match inputs.get("kpoints") {
        Some(ParsedValue::Kpoints(record)) => record,
        Some(other) => {
            return Err(compose_error(
                NodeType::Kpoints,
                format!("'kpoints' is not a k-points record: {:?}", other),
            ))
        }
        None => return Err(compose_error(NodeType::Kpoints, "missing quantity 'kpoints'")),
    };

    Ok(kpoints_from_record(record))
}

fn numeric_input<'a>(inputs: &'a ParsedQuantities, key: &str) -> Option<&'a NdArray> {
    match inputs.get(key)? {
        ParsedValue::Array(array) => Some(array),
        ParsedValue::Arrays(arrays) => match arrays.get(key) {
            Some(ArrayEntry::Numeric(array)) => Some(array),
            _ => None,
        },
        _ => None,
    }
}

fn compose_bands(inputs: &ParsedQuantities) -> Result<BandsData> {
    let missing: Vec<&str> = NodeType::Bands
        .required_quantities()
        .iter()
        .copied()
        .filter(|q| !inputs.contains_key(*q))
        .collect();
    if !missing.is_empty() {
        return Err(compose_error(
            NodeType::Bands,
            format!("missing quantities: {}", missing.join(", ")),
        ));
    }

    let kpoints = compose_kpoints(inputs)?;
    let bands = numeric_input(inputs, "eigenvalues")
        .ok_or_else(|| compose_error(NodeType::Bands, "'eigenvalues' is not a numeric array"))?;
    let occupations = numeric_input(inputs, "occupancies")
        .ok_or_else(|| compose_error(NodeType::Bands, "'occupancies' is not a numeric array"))?;

    BandsData::new(kpoints, bands.clone(), Some(occupations.clone()))
}

fn compose_blob(node_type: NodeType, inputs: &ParsedQuantities) -> Result<FileBlob> {
    if inputs.len() != 1 {
        return Err(compose_error(
            node_type,
            format!("expected exactly one file, got {} inputs", inputs.len()),
        ));
    }
    match inputs.values().next() {
        Some(ParsedValue::File(path)) => Ok(FileBlob { path: path.clone() }),
        _ => Err(compose_error(node_type, "input is not a file")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{KpointsRecord, RawKpoint, SiteRecord, StructureRecord};
    use crate::parsers::file_parsers::{ParsableItem, ParsableItems};
    use serde_json::json;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn eigen_inputs() -> ParsedQuantities {
        let mut parsed = ParsedQuantities::new();
        parsed.insert(
            "kpoints".into(),
            ParsedValue::Kpoints(KpointsRecord::Explicit {
                points: vec![
                    RawKpoint { point: [0.0, 0.0, 0.0], weight: Some(0.25), direct: true },
                    RawKpoint { point: [0.5, 0.0, 0.0], weight: Some(0.75), direct: true },
                ],
            }),
        );
        parsed.insert(
            "eigenvalues".into(),
            ParsedValue::Array(NdArray::new(vec![1, 2, 2], vec![-1.0, 1.0, -0.5, 1.5]).unwrap()),
        );
        parsed.insert(
            "occupancies".into(),
            ParsedValue::Array(NdArray::new(vec![1, 2, 2], vec![1.0, 0.0, 1.0, 0.0]).unwrap()),
        );
        parsed
    }

    #[test]
    fn test_dict_equals_input() {
        let mut parsed = ParsedQuantities::new();
        parsed.insert("total_energies".into(), ParsedValue::Json(json!({"energy": -1.0})));

        let node = compose_inputs(NodeType::Dict, &parsed).unwrap();
        assert_eq!(
            serde_json::Value::Object(node.as_dict().unwrap().clone()),
            json!({"total_energies": {"energy": -1.0}})
        );
    }

    #[test]
    fn test_automatic_kpoints_mesh() {
        let mut parsed = ParsedQuantities::new();
        parsed.insert(
            "kpoints".into(),
            ParsedValue::Kpoints(KpointsRecord::Automatic {
                divisions: [2, 2, 2],
                shifts: [0.0, 0.0, 0.0],
            }),
        );
        let node = compose_inputs(NodeType::Kpoints, &parsed).unwrap();
        assert_eq!(
            node,
            OutputNode::Kpoints(KpointsData::Mesh {
                mesh: [2, 2, 2],
                offset: [0.0, 0.0, 0.0]
            })
        );
    }

    #[test]
    fn test_explicit_kpoints_weights_follow_first_point() {
        let mut parsed = ParsedQuantities::new();
        parsed.insert(
            "kpoints".into(),
            ParsedValue::Kpoints(KpointsRecord::Explicit {
                points: vec![
                    RawKpoint { point: [0.0, 0.0, 0.0], weight: None, direct: false },
                    RawKpoint { point: [0.1, 0.0, 0.0], weight: Some(2.0), direct: false },
                ],
            }),
        );
        match compose_inputs(NodeType::Kpoints, &parsed).unwrap() {
            OutputNode::Kpoints(KpointsData::List { weights, cartesian, points }) => {
                assert_eq!(weights, None);
                assert!(cartesian);
                assert_eq!(points.len(), 2);
            }
            other => panic!("unexpected node {:?}", other),
        }
    }

    #[test]
    fn test_bands_embed_independent_kpoints_node() {
        let inputs = eigen_inputs();
        let bands = compose_inputs(NodeType::Bands, &inputs).unwrap();
        let kpoints = compose_inputs(NodeType::Kpoints, &inputs).unwrap();

        match (bands, kpoints) {
            (OutputNode::Bands(b), OutputNode::Kpoints(k)) => {
                assert_eq!(b.kpoints, k);
                assert_eq!(b.bands.shape, vec![1, 2, 2]);
                assert!(b.occupations.is_some());
            }
            other => panic!("unexpected nodes {:?}", other),
        }
    }

    #[test]
    fn test_bands_require_all_three_quantities() {
        for missing in ["kpoints", "eigenvalues", "occupancies"] {
            let mut inputs = eigen_inputs();
            inputs.remove(missing);
            let err = compose_inputs(NodeType::Bands, &inputs).unwrap_err();
            assert!(matches!(err, VaspflowError::ComposeError { .. }), "{}", missing);
        }
    }

    #[test]
    fn test_structure_from_record() {
        let mut parsed = ParsedQuantities::new();
        parsed.insert(
            "structure".into(),
            ParsedValue::Structure(StructureRecord {
                unitcell: [[3.0, 0.0, 0.0], [0.0, 3.0, 0.0], [0.0, 0.0, 3.0]],
                sites: vec![SiteRecord {
                    position: [0.0, 0.0, 0.0],
                    symbol: "Fe".into(),
                    kind_name: "Fe1".into(),
                }],
            }),
        );
        match compose_inputs(NodeType::Structure, &parsed).unwrap() {
            OutputNode::Structure(s) => {
                assert_eq!(s.sites.len(), 1);
                assert_eq!(s.kind_names(), vec!["Fe1".to_string()]);
                assert_eq!(s.cell.matrix[1][1], 3.0);
            }
            other => panic!("unexpected node {:?}", other),
        }
    }

    #[test]
    fn test_trajectory_symbols_become_attribute() {
        let mut arrays = crate::models::ArrayMap::new();
        arrays.insert("positions".into(), ArrayEntry::Numeric(NdArray::from_rows(&[[0.0; 3]])));
        arrays.insert("symbols".into(), ArrayEntry::Labels(vec!["H".into()]));
        let mut parsed = ParsedQuantities::new();
        parsed.insert("trajectory".into(), ParsedValue::Arrays(arrays));

        match compose_inputs(NodeType::Trajectory, &parsed).unwrap() {
            OutputNode::Trajectory(t) => {
                assert!(t.arrays.contains_key("positions"));
                assert!(!t.arrays.contains_key("symbols"));
                assert_eq!(t.attributes["symbols"], json!(["H"]));
            }
            other => panic!("unexpected node {:?}", other),
        }
    }

    #[test]
    fn test_blob_requires_exactly_one_file() {
        let mut parsed = ParsedQuantities::new();
        parsed.insert("chgcar".into(), ParsedValue::File("CHGCAR".into()));
        assert!(compose_inputs(NodeType::ChargeDensity, &parsed).is_ok());

        parsed.insert("wavecar".into(), ParsedValue::File("WAVECAR".into()));
        assert!(compose_inputs(NodeType::ChargeDensity, &parsed).is_err());
        assert!(compose_inputs(NodeType::Wavefunction, &ParsedQuantities::new()).is_err());
    }

    #[test]
    fn test_equivalent_value_stored_under_primary_key() {
        let mut items = ParsableItems::new();
        items.insert("ibz-kpoints".into(), ParsableItem::named("kpoints"));
        let registry = ParsableQuantities::from_items(&items, Some("IBZKPT")).unwrap();

        let mut parsed = ParsedQuantities::new();
        parsed.insert(
            "ibz-kpoints".into(),
            ParsedValue::Kpoints(KpointsRecord::Automatic {
                divisions: [3, 3, 3],
                shifts: [0.0; 3],
            }),
        );
        let composer = NodeComposer::new(registry, parsed);

        let inputs = composer.collect_quantity_data(&names(&["kpoints"]));
        assert_eq!(inputs.keys().collect::<Vec<_>>(), vec!["kpoints"]);

        let node = composer.compose("array.kpoints", None).unwrap();
        assert_eq!(node.node_type(), NodeType::Kpoints);
    }

    #[test]
    fn test_missing_quantity_is_omitted() {
        let composer = NodeComposer::default();
        let node = composer.compose("dict", Some(&names(&["total_energies"]))).unwrap();
        assert!(node.as_dict().unwrap().is_empty());
    }

    #[test]
    fn test_unknown_node_type_is_fatal() {
        let composer = NodeComposer::default();
        let err = composer.compose("array.unknown", None).unwrap_err();
        assert!(matches!(err, VaspflowError::UnknownNodeType(_)));
    }

    struct FakeParser {
        items: ParsableItems,
        calls: usize,
    }

    impl FileParser for FakeParser {
        fn parsable_items(&self) -> &ParsableItems {
            &self.items
        }

        fn get_quantity(&mut self, key: &str) -> Result<Option<ParsedValue>> {
            self.calls += 1;
            Ok(match key {
                "poscar-structure" => Some(ParsedValue::Structure(StructureRecord {
                    unitcell: [[2.0, 0.0, 0.0], [0.0, 2.0, 0.0], [0.0, 0.0, 2.0]],
                    sites: Vec::new(),
                })),
                _ => None,
            })
        }
    }

    #[test]
    fn test_from_file_parser_resolves_canonical_names() {
        let mut items = ParsableItems::new();
        items.insert("poscar-structure".into(), ParsableItem::named("structure"));
        let mut parser = FakeParser { items, calls: 0 };

        let composer = NodeComposer::from_file_parser(&mut parser).unwrap();
        assert_eq!(parser.calls, 1);

        let node = composer.compose("structure", None).unwrap();
        assert_eq!(node.node_type(), NodeType::Structure);
    }
}
