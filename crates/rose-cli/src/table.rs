//! Plain text tables

/// Column-aligned table; widths follow the widest cell
#[derive(Debug, Clone, Default)]
pub(crate) struct Table {
    head: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub(crate) fn new<I, S>(head: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            head: head.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub(crate) fn push<I, S>(&mut self, row: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rows.push(row.into_iter().map(Into::into).collect());
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Render with a leading space and two spaces between columns
    pub(crate) fn render(&self) -> String {
        let columns = self
            .rows
            .iter()
            .map(Vec::len)
            .chain(std::iter::once(self.head.len()))
            .max()
            .unwrap_or(0);
        let mut widths = vec![0_usize; columns];
        for row in std::iter::once(&self.head).chain(&self.rows) {
            for (i, cell) in row.iter().enumerate() {
                widths[i] = widths[i].max(cell.chars().count());
            }
        }

        let mut out = String::new();
        for row in std::iter::once(&self.head).chain(&self.rows) {
            let mut line = String::from(" ");
            for (i, width) in widths.iter().enumerate() {
                let cell = row.get(i).map_or("", String::as_str);
                if i > 0 {
                    line.push_str("  ");
                }
                line.push_str(&format!("{cell:<width$}"));
            }
            out.push_str(line.trim_end());
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn columns_are_aligned() {
        let mut table = Table::new(["NAME", "UUID"]);
        table.push(["Fetch", "1234"]);
        table.push(["Pick and Place", "5"]);
        assert_eq!(
            table.render(),
            " NAME            UUID\n Fetch           1234\n Pick and Place  5\n"
        );
    }

    #[test]
    fn widths_count_characters() {
        let mut table = Table::new(["", "FOLDER"]);
        table.push([" └── ", "a"]);
        let rendered = table.render();
        assert_eq!(rendered.lines().nth(1), Some("  └──   a"));
    }

    #[test]
    fn short_rows_are_padded() {
        let mut table = Table::new(["A", "B"]);
        table.push(["x"]);
        assert!(!table.is_empty());
        assert_eq!(table.render(), " A  B\n x\n");
    }
}
