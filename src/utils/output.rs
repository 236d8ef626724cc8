//! # 美化输出工具
//!
//! 提供统一的终端输出样式：状态前缀、标题栏、退出码与节点摘要。
//!
//! ## 依赖关系
//! - 被所有 `commands/` 模块使用
//! - 使用 `colored` crate

use crate::models::OutputNode;
use colored::Colorize;

/// 打印成功消息
pub fn print_success(msg: &str) {
    println!("{} {}", "[OK]".green().bold(), msg);
}

/// 打印错误消息
pub fn print_error(msg: &str) {
    eprintln!("{} {}", "[ERR]".red().bold(), msg);
}

/// 打印警告消息
pub fn print_warning(msg: &str) {
    println!("{} {}", "[WARN]".yellow().bold(), msg);
}

/// 打印信息消息
pub fn print_info(msg: &str) {
    println!("{} {}", "[*]".blue().bold(), msg);
}

/// 打印完成消息
pub fn print_done(msg: &str) {
    println!("{} {}", "[DONE]".green().bold(), msg);
}

/// 打印退出码，非零时以红色显示
pub fn print_exit_status(status: u32, message: &str) {
    let code = format!("[{:>3}]", status);
    if status == 0 {
        println!("{} {}", code.green().bold(), "finished ok");
    } else {
        println!("{} {}", code.red().bold(), message);
    }
}

/// 打印输出节点：链接名、节点类型与摘要
pub fn print_node(link_name: &str, node: &OutputNode) {
    println!(
        "  {} {} {} {}",
        link_name.bold(),
        "->".cyan(),
        node.node_type().tag().dimmed(),
        format!("({})", node.summary()).dimmed()
    );
}

/// 打印标题栏
pub fn print_header(title: &str) {
    let line = "─".repeat(60);
    println!("\n{}", line.dimmed());
    println!("  {}", title.bold());
    println!("{}\n", line.dimmed());
}

/// 打印分隔线
pub fn print_separator() {
    println!("{}", "─".repeat(60).dimmed());
}
