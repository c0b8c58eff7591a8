//! Human-readable registry dump
//!
//! Two box-drawn tables: the registered processors, then every row in use.

use std::fmt::Write;

use crate::registry::Registry;

/// Simple box-drawing table
struct Table {
    headers: Vec<Vec<&'static str>>,
    rows: Vec<Vec<String>>,
}

impl Table {
    fn new(headers: Vec<Vec<&'static str>>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    fn push(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    fn widths(&self) -> Vec<usize> {
        let columns = self.headers.first().map(|h| h.len()).unwrap_or(0);
        (0..columns)
            .map(|c| {
                let head = self
                    .headers
                    .iter()
                    .map(|h| h[c].chars().count())
                    .max()
                    .unwrap_or(0);
                let body = self
                    .rows
                    .iter()
                    .map(|r| r[c].chars().count())
                    .max()
                    .unwrap_or(0);
                head.max(body)
            })
            .collect()
    }

    fn rule(out: &mut String, widths: &[usize], left: char, mid: char, right: char) {
        out.push(left);
        for (i, w) in widths.iter().enumerate() {
            if i > 0 {
                out.push(mid);
            }
            out.extend(std::iter::repeat('─').take(w + 2));
        }
        out.push(right);
        out.push('\n');
    }

    fn line<S: AsRef<str>>(out: &mut String, widths: &[usize], cells: &[S]) {
        out.push('│');
        for (cell, w) in cells.iter().zip(widths) {
            let _ = write!(out, " {:<w$} │", cell.as_ref(), w = *w);
        }
        out.push('\n');
    }

    fn render(&self, out: &mut String) {
        let widths = self.widths();
        Self::rule(out, &widths, '┌', '┬', '┐');
        for h in &self.headers {
            Self::line(out, &widths, h);
        }
        Self::rule(out, &widths, '├', '┼', '┤');
        for r in &self.rows {
            Self::line(out, &widths, r);
        }
        Self::rule(out, &widths, '└', '┴', '┘');
    }
}

impl Registry {
    /// Render the processor table and the variable table.
    pub fn dump(&self) -> String {
        let mut out = String::new();

        let mut procs = Table::new(vec![vec!["Proc", "PID", "Port", "Events"]]);
        for slot in self.active.iter().filter(|s| s.is_used()) {
            procs.push(vec![
                slot.partner.id.to_string(),
                slot.partner.pid.to_string(),
                slot.partner.port.to_string(),
                slot.events().to_string(),
            ]);
        }
        out.push_str("Registered processors:\n");
        procs.render(&mut out);

        let mut vars = Table::new(vec![
            vec![
                "Seq", "C", "Offering", "PID", "Port", "Flg", "Accepting", "PID", "Port", "Flg",
                "OAOA", "State", "Name",
            ],
            vec!["", "", "proc", "", "", "", "proc", "", "", "", "SSUU", "", ""],
        ]);
        for v in self.used_rows() {
            vars.push(vec![
                format!("{}", v.key.as_raw() & 0xFFFF),
                v.coupling().to_string(),
                v.offering.id.to_string(),
                v.offering.pid.to_string(),
                v.offering.port.to_string(),
                format!("{:02X}", v.offering.flags.bits()),
                v.accepting.id.to_string(),
                v.accepting.pid.to_string(),
                v.accepting.port.to_string(),
                format!("{:02X}", v.accepting.flags.bits()),
                v.combined_control().to_string(),
                v.state().to_string(),
                v.name.to_string(),
            ]);
        }
        out.push_str("Shared variables:\n");
        vars.render(&mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use svar_types::ids::ApNum3;
    use svar_types::name::VarName;
    use svar_types::partner::Partner;

    #[test]
    fn test_dump_empty_registry() {
        let reg = Registry::new();
        let text = reg.dump();
        assert!(text.contains("Registered processors:"));
        assert!(text.contains("Shared variables:"));
        assert!(text.contains("┌"));
        assert!(text.contains("└"));
    }

    #[test]
    fn test_dump_lists_rows_and_processors() {
        let mut reg = Registry::new();
        let mut out = Vec::new();
        reg.register_processor(ApNum3::single(1001), 4242, 5000);
        reg.match_or_make(
            &VarName::new("ALPHA"),
            ApNum3::single(1002),
            Partner::new(ApNum3::single(1001), 4242, 5000),
            &mut out,
        )
        .unwrap();

        let text = reg.dump();
        assert!(text.contains("ALPHA"));
        assert!(text.contains("4242"));
        assert!(text.contains("1002"));

        // every line of the variable table has the same width
        let (_, vars) = text.split_once("Shared variables:\n").unwrap();
        let widths: Vec<usize> = vars.lines().map(|l| l.chars().count()).collect();
        assert_eq!(widths.len(), 6);
        assert!(widths.windows(2).all(|w| w[0] == w[1]));
    }
}
