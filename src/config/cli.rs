use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the trellis binary.
#[derive(Debug, Parser)]
#[command(name = "trellis", version, about = "Theme asset compiler")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "TRELLIS_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: GlobalOverrides,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Compile a layout and print the rendered document.
    Render(RenderArgs),
    /// Precompile a template's layout and print its group summary.
    Inspect(InspectArgs),
    /// Resolve a public or static asset and print its body.
    Asset(AssetArgs),
}

/// Overrides shared by every subcommand.
#[derive(Debug, Args, Default, Clone)]
pub struct GlobalOverrides {
    /// Override the theme directory.
    #[arg(long = "theme", value_name = "PATH", value_hint = ValueHint::DirPath, global = true)]
    pub theme_location: Option<PathBuf>,

    /// Toggle minification of css and javascript assets.
    #[arg(
        long = "minify",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub minify: Option<bool>,

    /// Toggle concatenation of scripts and styles.
    #[arg(
        long = "concat",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub concat: Option<bool>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,
}

#[derive(Debug, Args, Clone)]
pub struct RenderArgs {
    /// Layout type to render.
    #[arg(long = "type", value_name = "TYPE")]
    pub layout_type: String,

    /// Preferred template id; other templates of the type are tried when it does not build.
    #[arg(long, value_name = "ID")]
    pub template: Option<String>,

    /// JSON file holding the rendering context.
    #[arg(long, value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub context: Option<PathBuf>,

    /// Cache the document under this route.
    #[arg(long, value_name = "ROUTE")]
    pub route: Option<String>,
}

#[derive(Debug, Args, Clone)]
pub struct InspectArgs {
    /// Template id to precompile.
    #[arg(long, value_name = "ID")]
    pub template: String,
}

#[derive(Debug, Args, Clone)]
pub struct AssetArgs {
    /// Public route such as `/assets/<layout>/scripts/app.js` or a static file path.
    #[arg(value_name = "ROUTE")]
    pub route: String,
}
