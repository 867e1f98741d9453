//! Indentation-tracking text sink for generated FunC.

const INDENT: &str = "    ";

#[derive(Debug, Default)]
pub struct FuncWriter {
    out: String,
    indent: usize,
}

impl FuncWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn indent(&self) -> usize {
        self.indent
    }

    pub fn line(&mut self, s: &str) {
        for _ in 0..self.indent {
            self.out.push_str(INDENT);
        }
        self.out.push_str(s);
        self.out.push('\n');
    }

    pub fn blank(&mut self) {
        self.out.push('\n');
    }

    /// `header {` and one level deeper.
    pub fn open_block(&mut self, header: &str) {
        if header.is_empty() {
            self.line("{");
        } else {
            self.line(&format!("{header} {{"));
        }
        self.indent += 1;
    }

    pub fn close_block(&mut self) {
        self.indent = self.indent.saturating_sub(1);
        self.line("}");
    }

    /// Writes `header { ... }` around `body`. The indentation is restored even when `body`
    /// fails; the closing brace is only written on success.
    pub fn block<E>(
        &mut self,
        header: &str,
        body: impl FnOnce(&mut Self) -> Result<(), E>,
    ) -> Result<(), E> {
        let depth = self.indent;
        self.open_block(header);
        let res = body(self);
        self.indent = depth + 1;
        match res {
            Ok(()) => {
                self.close_block();
                Ok(())
            }
            Err(e) => {
                self.indent = depth;
                Err(e)
            }
        }
    }

    /// Infallible variant of [`FuncWriter::block`].
    pub fn scope(&mut self, header: &str, body: impl FnOnce(&mut Self)) {
        let res: Result<(), std::convert::Infallible> = self.block(header, |w| {
            body(w);
            Ok(())
        });
        match res {
            Ok(()) => {}
            Err(never) => match never {},
        }
    }

    /// `} else {` between two bodies at the current depth.
    pub fn else_branch(&mut self) {
        self.indent = self.indent.saturating_sub(1);
        self.line("} else {");
        self.indent += 1;
    }

    pub fn as_str(&self) -> &str {
        &self.out
    }

    pub fn finish(self) -> String {
        self.out
    }
}
