//! # compose 命令实现
//!
//! 只解析所需物理量，组装单个输出节点并以 JSON 输出。
//! 给定 `--file` 时只打开这一个文件，由它的解析器直接组装。
//!
//! ## 依赖关系
//! - 使用 `cli/compose.rs` 定义的参数
//! - 使用 `parsers/vasp.rs` (VaspParser::compose_node), `commands/parse.rs`
//! - 使用 `parsers/node_composer.rs`, `parsers/file_parsers/` (单文件组装)
//! - 使用 `utils/output.rs`

use super::parse::load_calcinfo;
use crate::cli::compose::ComposeArgs;
use crate::error::{Result, VaspflowError};
use crate::calcs::CalcInfo;
use crate::models::OutputNode;
use crate::parsers::file_parsers::{LazyFileParser, ParserKind};
use crate::parsers::{NodeComposer, VaspParser};
use crate::utils::output;

use std::fs;
use tracing::debug;

/// 执行 compose 命令
pub fn execute(args: ComposeArgs) -> Result<()> {
    let calcinfo = load_calcinfo(&args.workdir, None, &[])?;
    let node = match &args.file {
        Some(name) => compose_from_file(&args, &calcinfo, name)?,
        None => {
            let parser = VaspParser::new(&calcinfo.parser_settings, &calcinfo);
            parser.compose_node(&args.workdir, &args.node_type, &args.quantities)?
        }
    };
    let json = serde_json::to_string_pretty(&node)?;

    match &args.output {
        Some(path) => {
            fs::write(path, json).map_err(|e| VaspflowError::write(path, e))?;
            output::print_success(&format!(
                "{} node written to '{}'",
                node.node_type(),
                path.display()
            ));
        }
        None => println!("{}", json),
    }
    Ok(())
}

/// 只用一个文件的解析器组装节点
fn compose_from_file(args: &ComposeArgs, calcinfo: &CalcInfo, name: &str) -> Result<OutputNode> {
    let settings = &calcinfo.parser_settings;
    let kind = match &args.parser {
        Some(parser) => ParserKind::from_name(parser).ok_or_else(|| {
            VaspflowError::InvalidArgument(format!("Unknown parser '{}'", parser))
        })?,
        None => settings
            .parser_definitions()?
            .into_iter()
            .find(|def| def.file_name == name)
            .map(|def| def.kind)
            .ok_or_else(|| {
                VaspflowError::InvalidArgument(format!(
                    "No parser is defined for '{}'; choose one with --parser",
                    name
                ))
            })?,
    };

    let path = args.workdir.join(name);
    if !path.is_file() {
        return Err(VaspflowError::FileNotFound {
            path: path.display().to_string(),
        });
    }
    debug!("Composing {} from {} ({})", args.node_type, name, kind.name());

    let mut parser = LazyFileParser::open(kind, &path, settings.parser_options());
    let composer = NodeComposer::from_file_parser(&mut parser)?;
    let quantities = (!args.quantities.is_empty()).then_some(args.quantities.as_slice());
    composer.compose(&args.node_type, quantities)
}
