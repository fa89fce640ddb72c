use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "sitemapper",
    about = "Crawlt Websites und generiert standardkonforme sitemap.xml Dateien",
    version
)]
pub struct Cli {
    /// Start-URL der Website (z.B. https://example.com)
    #[arg(value_name = "URL")]
    pub url: Option<String>,

    /// Ausgabe-Pfad fuer sitemap.xml
    #[arg(short, long, default_value = "sitemap.xml", value_name = "PATH")]
    pub output: String,

    /// Maximale Crawl-Tiefe
    #[arg(short = 'd', long, default_value_t = 10, value_name = "N")]
    pub max_depth: u32,

    /// Max parallele Requests
    #[arg(short, long, default_value_t = 8, value_name = "N")]
    pub concurrency: usize,

    /// Timeout pro Seite in Sekunden
    #[arg(short, long, default_value_t = 30, value_name = "SEC")]
    pub timeout: u64,

    /// JavaScript mit Headless-Browser rendern (langsamer, aber vollstaendiger)
    #[arg(long)]
    pub render: bool,

    /// Browser sichtbar starten (Debugging)
    #[arg(long)]
    pub no_headless: bool,

    /// robots.txt ignorieren
    #[arg(long)]
    pub ignore_robots: bool,

    /// Custom User-Agent String
    #[arg(long, default_value = "", value_name = "UA")]
    pub user_agent: String,

    /// Cookie setzen (z.B. --cookie auth=token). Mehrfach verwendbar.
    #[arg(long, value_name = "NAME=VALUE")]
    pub cookie: Vec<String>,
}
