use std::process::ExitCode;

use secrecy::SecretString;

use crate::app::AppContext;
use crate::cli::ChangePasswordArgs;
use crate::commands::support::{emit, prompt_password, read_line, vault_error};
use crate::vault::{self, envelope, VaultService};

pub fn run(args: ChangePasswordArgs, ctx: &AppContext) -> ExitCode {
    let mut service = VaultService::new(ctx.vault_path.clone());

    if args.recover {
        let mut words = Vec::with_capacity(envelope::CHALLENGE_WORD_COUNT);
        for i in 0..envelope::CHALLENGE_WORD_COUNT {
            match read_line(&format!("Challenge word {}: ", i + 1)) {
                Ok(Some(word)) => words.push(word),
                _ => {
                    eprintln!("Error: all {} challenge words are required", envelope::CHALLENGE_WORD_COUNT);
                    return ExitCode::from(crate::exit_codes::EXIT_USER);
                }
            }
        }
        let challenge_words: [String; envelope::CHALLENGE_WORD_COUNT] =
            words.try_into().expect("exactly CHALLENGE_WORD_COUNT words collected");
        let passphrase: Option<SecretString> = read_line("Recovery passphrase (optional): ")
            .ok()
            .flatten()
            .map(SecretString::from);

        if let Err(err) = service.recover(&challenge_words, passphrase.as_ref()) {
            return vault_error(err);
        }
    } else {
        let password = match prompt_password("current master password") {
            Ok(p) => p,
            Err(code) => return code,
        };
        if let Err(err) = service.unlock(&password) {
            return vault_error(err);
        }
    }

    let new_password = match vault::prompt_new_master_password() {
        Ok(p) => p,
        Err(err) => {
            eprintln!("Error: {err}");
            return crate::exit_codes::exit_code_for_prompt_error(&err);
        }
    };

    if let Err(err) = service.change_password(&new_password) {
        return vault_error(err);
    }

    emit(
        ctx,
        serde_json::json!({"changed": true}),
        || "Master password changed.".to_string(),
    );
    ExitCode::SUCCESS
}
