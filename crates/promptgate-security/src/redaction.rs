use std::io::Write;

use tracing_subscriber::fmt::MakeWriter;

/// Wraps a log sink so every formatted line is scrubbed of API keys and
/// account keys before it is written.
pub struct RedactingWriter<M> {
    make_inner: M,
}

impl<M> RedactingWriter<M> {
    pub fn new(make_inner: M) -> Self {
        Self { make_inner }
    }
}

impl RedactingWriter<fn() -> std::io::Stderr> {
    pub fn stderr() -> Self {
        Self::new(std::io::stderr)
    }
}

impl<'a, M: MakeWriter<'a>> MakeWriter<'a> for RedactingWriter<M> {
    type Writer = Redacted<M::Writer>;

    fn make_writer(&'a self) -> Self::Writer {
        Redacted(self.make_inner.make_writer())
    }
}

/// One writer handed out by [`RedactingWriter`].
pub struct Redacted<W>(W);

impl<W: Write> Write for Redacted<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let line = String::from_utf8_lossy(buf);
        self.0.write_all(redact_secrets(&line).as_bytes())?;
        // Callers see their own length, not the redacted one.
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.0.flush()
    }
}

/// Replace known secret patterns with `[REDACTED]`.
pub fn redact_secrets(input: &str) -> String {
    static KEYED: std::sync::LazyLock<regex::Regex> = std::sync::LazyLock::new(|| {
        regex::Regex::new(
            r#"(?xi)
              (?P<prefix>api-key["']?\s*[:=]\s*["']?)[^\s"',;]+   # api-key header values
            | (?P<prefix2>AccountKey=)[^;\s"]+                 # connection-string account keys
            "#,
        )
        .expect("redaction regex should compile")
    });
    static BARE: std::sync::LazyLock<regex::Regex> = std::sync::LazyLock::new(|| {
        regex::Regex::new(
            r"(?x)
              sk-\S{20,}            # OpenAI-style keys
            | \b[0-9a-f]{32}\b      # Azure cognitive services keys
            ",
        )
        .expect("redaction regex should compile")
    });

    let keyed = KEYED.replace_all(input, |caps: &regex::Captures<'_>| {
        let prefix = caps
            .name("prefix")
            .or_else(|| caps.name("prefix2"))
            .map_or("", |m| m.as_str());
        format!("{prefix}[REDACTED]")
    });
    BARE.replace_all(&keyed, "[REDACTED]").into_owned()
}
