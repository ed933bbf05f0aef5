// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use clap::Parser;
use warpsign::cli::{setup, sign, sign_ci, Cli, Command};
use warpsign::config::{base_dir, Config};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let result = match cli.command {
        Command::Sign(args) => Config::load(&base_dir()).and_then(|config| sign::run(args, config)),
        Command::SignCi(args) => {
            Config::load(&base_dir()).and_then(|config| sign_ci::run(args, config))
        }
        Command::Setup(args) => setup::run(args),
    };

    if let Err(e) = result {
        log::error!("{e}");
        std::process::exit(e.exit_code());
    }
}
