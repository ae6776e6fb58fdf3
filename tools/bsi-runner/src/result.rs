//! 运行结果.

use bone_berry::pipeline::{BatchReport, Stage, StudyStatus};
use bone_berry::Study;
use std::io::{self, Write};

const S4: &str = "    ";

#[inline]
fn stages_to_display(stages: &[Stage]) -> String {
    if stages.is_empty() {
        return "/".to_string();
    }
    stages
        .iter()
        .map(Stage::name)
        .collect::<Vec<_>>()
        .join(", ")
}

/// 将 `study` 的阶段完成情况写进 `w` 中.
pub fn describe_status_into<W: Write>(
    study: &Study,
    status: &StudyStatus,
    w: &mut W,
) -> io::Result<()> {
    writeln!(w, "Study `{}`:", study.key())?;
    for (stage, done) in status.stages.iter() {
        let mark = if *done { "done" } else { "pending" };
        writeln!(w, "{S4}{:<16}{mark}", stage.name())?;
    }
    match status.next_step {
        Some(stage) => writeln!(w, "{S4}Next step: {stage}"),
        None => writeln!(w, "{S4}Next step: /"),
    }
}

/// 将批处理结果写进 `w` 中.
fn describe_report_into<W: Write>(report: &BatchReport, w: &mut W) -> io::Result<()> {
    for r in report.iter() {
        writeln!(w, "Study `{}`:", r.key)?;
        match &r.outcome {
            Ok(o) => {
                writeln!(w, "{S4}Executed: {}", stages_to_display(&o.executed))?;
                writeln!(w, "{S4}Skipped: {}", stages_to_display(&o.skipped))?;
            }
            Err(e) => writeln!(w, "{S4}Failed: {e}")?,
        }
    }
    let ok = report.succeeded().count();
    write!(
        w,
        "{ok} of {} studies succeeded, {} failed",
        report.len(),
        report.len() - ok
    )
}

/// 分析运行结果.
pub fn analyze(report: &BatchReport) {
    utils::sep();
    let mut buf = Vec::with_capacity(512);
    match describe_report_into(report, &mut buf) {
        Ok(()) => println!("{}", String::from_utf8_lossy(&buf)),
        Err(e) => log::error!("无法输出运行结果: {e}"),
    }
    utils::sep();
}
