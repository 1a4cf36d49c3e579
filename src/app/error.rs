use std::process::ExitCode;

use crate::Error;

/// Every failure, usage or provider, exits with status 1.
pub fn exit_code(_err: &Error) -> ExitCode {
    ExitCode::FAILURE
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::plan::Action;

    #[test]
    fn usage_and_provider_failures_share_exit_status() {
        assert_eq!(
            exit_code(&Error::UnknownFormat {
                format: "json".into()
            }),
            ExitCode::FAILURE
        );
        assert_eq!(
            exit_code(&Error::StepFailed {
                action: Action::Deploy,
                section: "psql",
                source: Box::new(Error::ProviderFailed {
                    command: "gcloud sql instances create".into(),
                    status: "exit status: 1".into(),
                    stderr: "PERMISSION_DENIED".into(),
                }),
            }),
            ExitCode::FAILURE
        );
    }
}
