use clap::{Parser, Subcommand};

/// Approvals - durable lead approval workflows
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub mode: Mode,
}

#[derive(Subcommand, Debug)]
pub enum Mode {
    /// Run the API server and orchestration engine
    Serve {
        /// API port (overrides SERVER_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Start a new approval instance
    Start {
        /// Message subject
        #[arg(long)]
        subject: String,

        /// Message body (Markdown)
        #[arg(long, default_value = "")]
        message: String,

        /// Caller reference echoed in the completion result
        #[arg(long)]
        correlation_id: String,

        /// Instance id (generated when omitted)
        #[arg(long)]
        instance_id: Option<String>,

        /// Customer name
        #[arg(long, default_value = "")]
        name: String,

        #[arg(long, default_value = "")]
        industry: String,

        /// Id of the stored lead form submission
        #[arg(long, default_value = "")]
        form_input_id: String,

        #[arg(long, default_value = "")]
        process_description: String,

        #[arg(long, default_value = "")]
        process_frequency: String,

        #[arg(long, default_value = "")]
        process_duration: String,
    },

    /// Deliver a reviewer decision to a waiting instance
    Raise {
        /// Instance id
        instance_id: String,

        /// Approve the request
        #[arg(long, conflicts_with = "reject")]
        approve: bool,

        /// Reject the request
        #[arg(long)]
        reject: bool,

        /// Rejection reason
        #[arg(short, long)]
        reason: Option<String>,
    },

    /// Fail an instance that is waiting for a decision
    Abandon {
        /// Instance id
        instance_id: String,

        /// Reason recorded in the instance history
        #[arg(short, long)]
        reason: Option<String>,
    },

    /// Get details of a specific instance
    Get {
        /// Instance id
        instance_id: String,

        /// Show execution history
        #[arg(long)]
        history: bool,

        /// Output format
        #[arg(short, long, default_value = "table")]
        output: String,
    },

    /// List approval instances
    List {
        /// Filter by status (Created, Running, WaitingForEvent, Completed, Failed)
        #[arg(long)]
        status: Option<String>,

        /// Output format
        #[arg(short, long, default_value = "table")]
        output: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_raise() {
        let args = Args::parse_from(["approvals-server", "raise", "lead-1", "--reject", "-r", "too costly"]);
        match args.mode {
            Mode::Raise {
                instance_id,
                approve,
                reject,
                reason,
            } => {
                assert_eq!(instance_id, "lead-1");
                assert!(!approve);
                assert!(reject);
                assert_eq!(reason.as_deref(), Some("too costly"));
            }
            other => panic!("unexpected mode {:?}", other),
        }
    }

    #[test]
    fn test_approve_conflicts_with_reject() {
        assert!(Args::try_parse_from(["approvals-server", "raise", "lead-1", "--approve", "--reject"]).is_err());
    }
}
