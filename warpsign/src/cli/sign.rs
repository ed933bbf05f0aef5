// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;

use clap::Args;
use warpsign_bundle::{Certificate, CertificateKind, TeamContext};
use warpsign_portal::PortalClient;

use crate::config::{self, Config};
use crate::error::{Error, Result};
use crate::flags::{CertificateChoice, SignFlags};
use crate::orchestrator::{Orchestrator, OrchestratorConfig};
use crate::progress::LogSink;
use crate::signer::LdidSigner;

#[derive(Debug, Args)]
pub struct SignArgs {
    /// Path to the .ipa to re-sign.
    pub ipa: PathBuf,

    /// Output path; defaults to `<ipa>-signed.ipa` next to the input.
    #[arg(long)]
    pub output: Option<PathBuf>,

    #[arg(long)]
    pub force_original_id: bool,

    #[arg(long)]
    pub patch_debug: bool,

    #[arg(long)]
    pub patch_file_sharing: bool,

    #[arg(long)]
    pub patch_promotion: bool,

    #[arg(long)]
    pub icon: Option<PathBuf>,

    #[arg(long)]
    pub prefix: Option<String>,

    /// Use the distribution certificate instead of development.
    #[arg(long)]
    pub distribution: bool,
}

pub struct PromptTwoFactor;

impl warpsign_portal::TwoFactorPrompt for PromptTwoFactor {
    fn prompt(
        &self,
        mode: warpsign_portal::TwoFactorMode,
        _hint: Option<&str>,
    ) -> warpsign_portal::Result<String> {
        let label = match mode {
            warpsign_portal::TwoFactorMode::TrustedDevice => "trusted device",
            warpsign_portal::TwoFactorMode::Sms => "SMS",
            warpsign_portal::TwoFactorMode::SecurityKey => "security key",
        };
        dialoguer::Input::new()
            .with_prompt(format!("Enter the verification code sent to your {label}"))
            .interact_text()
            .map_err(|e| warpsign_portal::Error::UnexpectedResponse(e.to_string()))
    }
}

pub fn run(args: SignArgs, config: Config) -> Result<()> {
    if !args.ipa.is_file() {
        return Err(Error::ArchiveUnreadable(args.ipa));
    }

    let cert_kind = if args.distribution {
        CertificateKind::Distribution
    } else {
        CertificateKind::Development
    };
    let cert_choice = if args.distribution {
        CertificateChoice::Distribution
    } else {
        CertificateChoice::Development
    };

    let flags = SignFlags {
        force_original_id: args.force_original_id,
        patch_debug: args.patch_debug,
        patch_file_sharing: args.patch_file_sharing,
        patch_promotion: args.patch_promotion,
        icon: args.icon.clone(),
        prefix: args.prefix.clone(),
        require_capabilities: false,
        passthrough_unknown_entitlements: false,
    };
    flags
        .validate(cert_choice)
        .map_err(|e| match e {
            crate::flags::FlagError::ForceOriginalIdNeedsDistribution => {
                Error::ForceOriginalIdNeedsDistribution
            }
            crate::flags::FlagError::PatchDebugNeedsDevelopment => Error::PatchDebugNeedsDevelopment,
        })?;

    let apple_id = config.require_apple_id()?.to_string();
    let home = config::base_dir();
    let sessions_dir = config::sessions_dir(&home);

    let mut portal = PortalClient::new(apple_id.clone(), &sessions_dir, Box::new(PromptTwoFactor))?;
    let password = config.apple_password.clone().unwrap_or_else(|| {
        dialoguer::Password::new()
            .with_prompt(format!("Password for {apple_id}"))
            .interact()
            .unwrap_or_default()
    });
    portal.ensure_authenticated(&password)?;

    let team_summary = portal.resolve_team(None)?;
    let certificates = portal.list_certificates(&team_summary.team_id)?;
    let certificate_summary = certificates
        .into_iter()
        .find(|c| {
            let wants_distribution = cert_kind == CertificateKind::Distribution;
            c.certificate_type.name.to_lowercase().contains("distribution") == wants_distribution
        })
        .ok_or(Error::MissingConfigKey("matching certificate"))?;

    let certificate = Certificate {
        serial: certificate_summary.certificate_id,
        key_fingerprint: String::new(),
        kind: cert_kind,
    };
    let mut team = TeamContext::new(team_summary.team_id, certificate);

    let output = args.output.clone().unwrap_or_else(|| {
        let mut out = args.ipa.clone();
        out.set_file_name(format!(
            "{}-signed.ipa",
            args.ipa.file_stem().and_then(|s| s.to_str()).unwrap_or("app")
        ));
        out
    });

    let orchestrator_config = OrchestratorConfig {
        prefix: flags.prefix.clone().unwrap_or_default(),
        flags,
        fan_out: 4,
    };

    let signer = LdidSigner::default();
    let sink = LogSink;
    let orchestrator = Orchestrator::new(orchestrator_config, &signer, &sink);
    let cancel = AtomicBool::new(false);

    orchestrator.run(&args.ipa, &output, &mut team, Some(&portal), &cancel)
}
