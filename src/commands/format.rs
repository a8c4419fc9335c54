use std::io::IsTerminal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Pretty,
    Text,
    Json,
}

/// `--json` wins; otherwise the explicit format, else pretty on a TTY.
pub fn resolve(format: Option<OutputFormat>, json: bool) -> OutputFormat {
    if json {
        return OutputFormat::Json;
    }
    format.unwrap_or_else(|| {
        if std::io::stdout().is_terminal() {
            OutputFormat::Pretty
        } else {
            OutputFormat::Text
        }
    })
}
