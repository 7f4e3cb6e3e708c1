use clap::Parser;

use crate::phar::{DEFAULT_SCAN_WINDOW, ParseOptions};

#[derive(Parser, Debug)]
#[command(name = "runphar")]
#[command(version)]
#[command(about = "A Rust PHAR extractor with HTTP URL support", long_about = None)]
#[command(after_help = "Examples:\n  \
  runphar app.phar -x tests        extract all files except tests from app.phar\n  \
  runphar -p app.phar index.php    send index.php from app.phar to stdout\n  \
  runphar -v https://example.com/tool.phar   list files from remote PHAR")]
pub struct Cli {
    /// PHAR file path or HTTP URL
    #[arg(value_name = "FILE")]
    pub file: String,

    /// Files to extract (default: all)
    #[arg(value_name = "FILES")]
    pub files: Vec<String>,

    /// List files (short format)
    #[arg(short = 'l')]
    pub list: bool,

    /// List verbosely (sizes, date, CRC)
    #[arg(short = 'v')]
    pub verbose: bool,

    /// Display archive information (version, alias, signature)
    #[arg(short = 'z')]
    pub info: bool,

    /// Extract files to pipe, no messages
    #[arg(short = 'p')]
    pub pipe: bool,

    /// Extract files into exdir
    #[arg(short = 'd', value_name = "DIR")]
    pub extract_dir: Option<String>,

    /// Exclude files that follow
    #[arg(short = 'x', value_name = "FILE", num_args = 1..)]
    pub exclude: Vec<String>,

    /// Never overwrite existing files
    #[arg(short = 'n')]
    pub never_overwrite: bool,

    /// Overwrite files WITHOUT prompting
    #[arg(short = 'o')]
    pub overwrite: bool,

    /// Junk paths (do not make directories)
    #[arg(short = 'j')]
    pub junk_paths: bool,

    /// Quiet mode (-qq => quieter)
    #[arg(short = 'q', action = clap::ArgAction::Count)]
    pub quiet: u8,

    /// Skip signature and CRC verification (content is untrusted)
    #[arg(long = "no-verify")]
    pub no_verify: bool,

    /// Bytes read per step while looking for the end of the stub
    #[arg(long = "scan-window", value_name = "BYTES", default_value_t = DEFAULT_SCAN_WINDOW)]
    pub scan_window: usize,
}

impl Cli {
    pub fn is_http_url(&self) -> bool {
        self.file.starts_with("http://") || self.file.starts_with("https://")
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet > 0 || self.pipe
    }

    pub fn is_very_quiet(&self) -> bool {
        self.quiet > 1
    }

    pub fn parse_options(&self) -> ParseOptions {
        ParseOptions::default().with_scan_window(self.scan_window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_map_to_options() {
        let cli = Cli::try_parse_from([
            "runphar",
            "--no-verify",
            "--scan-window",
            "512",
            "-qq",
            "https://example.com/app.phar",
            "index.php",
        ])
        .unwrap();

        assert!(cli.is_http_url());
        assert!(cli.no_verify);
        assert!(cli.is_very_quiet());
        assert_eq!(cli.files, vec!["index.php"]);
        assert_eq!(cli.parse_options().scan_window, 512);
    }

    #[test]
    fn defaults() {
        let cli = Cli::try_parse_from(["runphar", "app.phar"]).unwrap();
        assert!(!cli.is_http_url());
        assert!(!cli.is_quiet());
        assert_eq!(cli.scan_window, DEFAULT_SCAN_WINDOW);
    }
}
