use std::env;
use std::process;

use nomadlib::{Portal, PortalConfig};
use tracing_subscriber::EnvFilter;

pub fn usage_and_exit(usage: &str) -> ! {
    eprintln!("{usage}");
    process::exit(1);
}

/// Log to stderr, filtered by `RUST_LOG` (default `nomadlib=info`).
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("nomadlib=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

pub struct ArgParser {
    args: Vec<String>,
    usage: &'static str,
}

impl ArgParser {
    pub fn new(usage: &'static str) -> Self {
        let args: Vec<String> = env::args().skip(1).collect();

        if args.iter().any(|a| a == "--help" || a == "-h") {
            println!("{usage}");
            process::exit(0);
        }

        Self { args, usage }
    }

    pub fn take_value(&mut self, names: &[&str]) -> Option<String> {
        let mut i = 0;
        while i < self.args.len() {
            if names.contains(&self.args[i].as_str()) {
                let value = self.args.get(i + 1).cloned();
                if value.is_none() {
                    usage_and_exit(self.usage);
                }
                self.args.drain(i..=i + 1);
                return value;
            }
            i += 1;
        }
        None
    }

    #[allow(dead_code)] // Not every demo has boolean flags.
    pub fn take_flag(&mut self, names: &[&str]) -> bool {
        match self.args.iter().position(|a| names.contains(&a.as_str())) {
            Some(i) => {
                self.args.remove(i);
                true
            }
            None => false,
        }
    }

    pub fn remaining(self) -> Vec<String> {
        self.args
    }
}

/// Connection settings shared by every demo.
pub struct Connection {
    pub api_base: Option<String>,
    pub token: Option<String>,
    pub proxy: Option<String>,
}

impl Connection {
    /// Take `--api-base`, `--token` and `--proxy` from the arguments.
    pub fn from_parser(parser: &mut ArgParser) -> Self {
        Self {
            api_base: parser.take_value(&["--api-base", "-a"]),
            token: parser.take_value(&["--token", "-t"]),
            proxy: parser.take_value(&["--proxy"]),
        }
    }

    /// Load `config/nomad.*` and `NOMAD__*`, then apply the command-line overrides.
    pub fn connect(self) -> nomadlib::Result<Portal> {
        let mut config = PortalConfig::load()?;
        if let Some(api_base) = self.api_base {
            config.api_base = api_base;
        }
        if self.token.is_some() {
            config.access_token = self.token;
        }
        if self.proxy.is_some() {
            config.proxy = self.proxy;
        }
        Portal::connect(config)
    }
}
