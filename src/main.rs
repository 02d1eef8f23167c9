use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::Utc;
use clap::{ArgGroup, Parser, Subcommand, ValueEnum};

mod access;
mod checkin;
mod client;
mod config;
mod error;
mod identity;
mod messages;
mod models;
mod notification;
mod profile;
mod report;
mod session;
mod status;
#[cfg(test)]
mod testing;

use crate::client::ApiClient;
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::identity::IdentityClient;
use crate::messages::{Feedback, Msg};
use crate::models::{
    RegionInput, Role, SafetyStatus, Timestamp, UserFieldsPatch, UserRecord, UserStatus,
    WireTimestamp,
};
use crate::notification::{NavigationIntent, PushPayload, PushSubscription, SubscriptionRegistration};
use crate::profile::ProfileInput;
use crate::session::{Session, SessionStore};
use crate::status::StatusRow;

#[derive(Parser)]
#[command(name = "safety-checkin")]
#[command(about = "Safety check-in client: answer check-ins and watch who is overdue", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in and remember the session
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        /// Push subscription JSON to register after signing in
        #[arg(long)]
        subscription: Option<PathBuf>,
    },
    /// Create an account; a verification email is sent
    Signup {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Send a password reset email
    ResetPassword {
        #[arg(long)]
        email: String,
    },
    /// Send the verification email again
    ResendVerification {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Forget the stored session
    Logout,
    /// Show the signed-in account and where it lands
    Whoami,
    /// Answer the latest check-in request
    Respond {
        #[arg(value_parser = SafetyStatus::from_str)]
        answer: SafetyStatus,
        #[arg(long, default_value = "")]
        comment: String,
    },
    /// Show the check-in status of one user (yourself by default)
    Status {
        #[arg(long)]
        uid: Option<String>,
    },
    /// Show the status of every user visible to you
    Statuses {
        #[arg(long)]
        uid: Option<String>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Classify an exported status sheet without contacting the backend
    EvaluateCsv {
        #[arg(long)]
        csv: PathBuf,
        /// Evaluation instant (RFC 3339); defaults to now
        #[arg(long)]
        now: Option<String>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Manage users (admin)
    Users {
        #[command(subcommand)]
        command: UserCommand,
    },
    /// Manage regions
    Regions {
        #[command(subcommand)]
        command: RegionCommand,
    },
    /// Personal information
    Profile {
        #[command(subcommand)]
        command: ProfileCommand,
    },
    /// Register a push subscription for the signed-in user
    Subscribe {
        #[arg(long)]
        file: PathBuf,
    },
    /// Resolve where an activated notification should navigate
    PushOpen {
        #[arg(long)]
        payload: PathBuf,
    },
}

#[derive(Subcommand)]
enum UserCommand {
    List,
    Approve {
        uid: String,
    },
    Role {
        uid: String,
        #[arg(value_parser = Role::from_str)]
        role: Role,
    },
    #[command(group(
        ArgGroup::new("fields")
            .args(["name", "surname", "phone", "region", "manager_uid"])
            .required(true)
            .multiple(true)
    ))]
    Fields {
        uid: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        surname: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        region: Option<String>,
        #[arg(long)]
        manager_uid: Option<String>,
    },
    Delete {
        uid: String,
    },
    /// Push a check-in prompt to one user
    Notify {
        uid: String,
    },
}

#[derive(Subcommand)]
enum RegionCommand {
    List,
    Add {
        name: String,
    },
    Rename {
        id: String,
        name: String,
    },
    Delete {
        id: String,
    },
    /// Push a check-in prompt to everyone in the region
    Notify {
        id: String,
    },
}

#[derive(Subcommand)]
enum ProfileCommand {
    Show,
    Save {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        surname: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        region: Option<String>,
        #[arg(long)]
        manager_uid: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Markdown,
    Csv,
}

impl Commands {
    /// Generic failure text for the command.
    fn action(&self) -> Msg {
        match self {
            Commands::Login { .. } => Msg::FailedToSignIn,
            Commands::Signup { .. } => Msg::FailedToCreateAccount,
            Commands::ResetPassword { .. } => Msg::FailedToSendPasswordReset,
            Commands::ResendVerification { .. } => Msg::FailedToSendVerificationEmail,
            Commands::Logout => Msg::FailedToSignOut,
            Commands::Respond { .. } => Msg::FailedToSaveResponse,
            Commands::Subscribe { .. } => Msg::FailedToSaveSubscription,
            Commands::PushOpen { .. } => Msg::FailedToOpenNotification,
            Commands::Whoami
            | Commands::Status { .. }
            | Commands::Statuses { .. }
            | Commands::EvaluateCsv { .. } => Msg::FailedToLoadData,
            Commands::Users { command } => match command {
                UserCommand::List => Msg::FailedToLoadData,
                UserCommand::Approve { .. } => Msg::FailedToApproveUser,
                UserCommand::Role { .. } => Msg::FailedToUpdateUserRole,
                UserCommand::Fields { .. } => Msg::FailedToUpdateUserFields,
                UserCommand::Delete { .. } => Msg::FailedToDeleteUser,
                UserCommand::Notify { .. } => Msg::FailedToSendNotification,
            },
            Commands::Regions { command } => match command {
                RegionCommand::List => Msg::FailedToLoadData,
                RegionCommand::Add { .. } => Msg::FailedToAddRegion,
                RegionCommand::Rename { .. } => Msg::FailedToUpdateRegion,
                RegionCommand::Delete { .. } => Msg::FailedToDeleteRegion,
                RegionCommand::Notify { .. } => Msg::FailedToSendNotification,
            },
            Commands::Profile { command } => match command {
                ProfileCommand::Show => Msg::FailedToLoadData,
                ProfileCommand::Save { .. } => Msg::FailedToSavePersonalInfo,
            },
        }
    }
}

struct App {
    config: Config,
    identity: IdentityClient,
    store: SessionStore,
}

impl App {
    fn new(config: Config) -> AppResult<Self> {
        let identity = IdentityClient::new(&config.identity, config.request_timeout)?;
        let store = SessionStore::new(config.session_file.clone());
        Ok(Self {
            config,
            identity,
            store,
        })
    }

    fn say(&self, msg: Msg) {
        show(&Feedback::success(msg, self.config.lang));
    }

    fn api(&self, session: &Session) -> AppResult<ApiClient> {
        Ok(ApiClient::new(&self.config.api_base_url, self.config.request_timeout)?
            .with_session(session))
    }

    async fn session(&self) -> AppResult<(Session, ApiClient)> {
        let session = session::resume(&self.store, &self.identity, Utc::now()).await?;
        let api = self.api(&session)?;
        Ok((session, api))
    }

    /// Signed-in, approved user and their record.
    async fn member(&self) -> AppResult<(Session, ApiClient, UserRecord)> {
        let (session, api) = self.session().await?;
        let me = api.find_user(session.uid()).await?.ok_or(AppError::NotApproved)?;
        access::require_approved(&me)?;
        Ok((session, api, me))
    }

    async fn admin(&self) -> AppResult<(Session, ApiClient)> {
        let (session, api, me) = self.member().await?;
        access::require_admin(&me)?;
        Ok((session, api))
    }

    async fn run(&self, command: Commands) -> AppResult<()> {
        match command {
            Commands::Login {
                email,
                password,
                subscription,
            } => {
                let session =
                    session::sign_in(&self.identity, &self.store, &email, &password, Utc::now())
                        .await?;
                let api = self.api(&session)?;
                let record = api.find_user(session.uid()).await?;
                self.say(Msg::SignedIn);
                if let Some(path) = subscription {
                    register_subscription(&api, &session, &path).await?;
                    self.say(Msg::SubscriptionSaved);
                }
                let landing = access::landing_after_sign_in(record.as_ref());
                println!("Next: {} ({})", landing.hint(), landing);
            }
            Commands::Signup { email, password } => {
                let account = self.identity.sign_up(&email, &password).await?;
                tracing::info!(uid = %account.local_id, email = %account.email, "account created");
                self.say(Msg::VerificationEmailSent);
                self.say(Msg::VerifyYourEmail);
            }
            Commands::ResetPassword { email } => {
                self.identity.send_password_reset(&email).await?;
                self.say(Msg::PasswordResetEmailSent);
            }
            Commands::ResendVerification { email, password } => {
                let result = self.identity.sign_in(&email, &password).await?;
                self.identity.send_email_verification(&result.id_token).await?;
                self.say(Msg::VerificationEmailSent);
            }
            Commands::Logout => {
                session::sign_out(&self.store)?;
                tracing::debug!(path = %self.store.path().display(), "session file removed");
                self.say(Msg::SignedOut);
            }
            Commands::Whoami => {
                let (session, api) = self.session().await?;
                let record = api.find_user(session.uid()).await?;
                println!("uid: {}", session.uid());
                println!("email: {}", session.email().unwrap_or("-"));
                if let Some(expires_at) = session.expires_at() {
                    println!("session expires: {}", expires_at.to_rfc3339());
                }
                match &record {
                    Some(user) => {
                        println!("name: {}", user.full_name());
                        println!("role: {}", user.role);
                        println!("status: {}", user.status);
                    }
                    None => println!("No profile submitted yet."),
                }
                let landing = access::landing_after_sign_in(record.as_ref());
                println!("Next: {} ({})", landing.hint(), landing);
            }
            Commands::Respond { answer, comment } => {
                let (_, api, _) = self.member().await?;
                let lock_path = self.config.session_file.with_file_name("respond.lock");
                let mut guard = checkin::SubmissionGuard::open(&lock_path)?;
                let form = checkin::CheckInForm {
                    status: Some(answer),
                    comment,
                };
                checkin::submit(&api, &mut guard, form).await?;
                self.say(Msg::ResponseSaved);
            }
            Commands::Status { uid } => {
                let (session, api, me) = self.member().await?;
                let uid = uid.unwrap_or_else(|| session.uid().to_string());
                if uid != session.uid() {
                    access::require_admin(&me)?;
                }
                let now = Utc::now();
                let snapshot = api.latest_status(&uid).await?;
                let view = status::evaluate_snapshot(&snapshot, now, self.config.overdue_window)?;
                println!("{uid}: {}", view.describe(now));
            }
            Commands::Statuses { uid, format, out } => {
                let (session, api) = self.admin().await?;
                let scope = uid.unwrap_or_else(|| session.uid().to_string());
                let now = Utc::now();
                let entries = api.statuses(&scope).await?;
                let rows = status::evaluate_entries(&entries, now, self.config.overdue_window);
                self.emit(&rows, format, out.as_deref(), &scope, now)?;
            }
            Commands::EvaluateCsv {
                csv,
                now,
                format,
                out,
            } => {
                let now = match now {
                    Some(text) => status::parse_timestamp(Some(&WireTimestamp::Text(text)))?,
                    None => Utc::now(),
                };
                let file = std::fs::File::open(&csv)?;
                let rows = report::read_csv(file, now, self.config.overdue_window)?;
                let scope = csv.display().to_string();
                self.emit(&rows, format, out.as_deref(), &scope, now)?;
            }
            Commands::Users { command } => self.run_users(command).await?,
            Commands::Regions { command } => self.run_regions(command).await?,
            Commands::Profile { command } => self.run_profile(command).await?,
            Commands::Subscribe { file } => {
                let (session, api) = self.session().await?;
                register_subscription(&api, &session, &file).await?;
                self.say(Msg::SubscriptionSaved);
            }
            Commands::PushOpen { payload } => {
                let payload = PushPayload::parse(&std::fs::read(&payload)?)?;
                let shown = payload.display();
                println!("{}", shown.title);
                if !shown.body.is_empty() {
                    println!("{}", shown.body);
                }
                if let Some(icon) = &shown.icon {
                    println!("icon: {icon}");
                }
                let intent = notification::on_activate(&payload, &self.config.app_origin);
                if let NavigationIntent::Rejected { requested, .. } = &intent {
                    println!("Refused to open {requested}.");
                }
                println!("Open: {}", intent.target());
            }
        }
        Ok(())
    }

    async fn run_users(&self, command: UserCommand) -> AppResult<()> {
        let (_, api) = self.admin().await?;
        match command {
            UserCommand::List => {
                let users = api.list_users().await?;
                if users.is_empty() {
                    println!("No users yet.");
                }
                for user in users {
                    println!(
                        "- {} <{}> {} [{}, {}] region: {}",
                        user.full_name(),
                        user.email,
                        user.uid,
                        user.role,
                        user.status,
                        if user.region.is_empty() { "-" } else { user.region.as_str() }
                    );
                }
            }
            UserCommand::Approve { uid } => {
                api.update_user_status(&uid, &UserStatus::Approved).await?;
                self.say(Msg::UserApproved);
            }
            UserCommand::Role { uid, role } => {
                api.update_user_role(&uid, role).await?;
                self.say(Msg::UserRoleUpdated);
            }
            UserCommand::Fields {
                uid,
                name,
                surname,
                phone,
                region,
                manager_uid,
            } => {
                let manager_name = match &manager_uid {
                    Some(manager_uid) => {
                        let managers = api.list_managers().await?;
                        let manager = managers
                            .iter()
                            .find(|manager| &manager.uid == manager_uid)
                            .ok_or(AppError::Validation(Msg::SelectManager))?;
                        Some(manager.full_name())
                    }
                    None => None,
                };
                let patch = UserFieldsPatch {
                    name,
                    surname,
                    phone,
                    region,
                    manager_uid,
                    manager_name,
                };
                api.update_user_fields(&uid, &patch).await?;
                self.say(Msg::UserFieldsUpdated);
            }
            UserCommand::Delete { uid } => {
                api.delete_user(&uid).await?;
                self.say(Msg::UserDeleted);
            }
            UserCommand::Notify { uid } => {
                api.notify_user(&uid).await?;
                self.say(Msg::NotificationSent);
            }
        }
        Ok(())
    }

    async fn run_regions(&self, command: RegionCommand) -> AppResult<()> {
        if let RegionCommand::List = command {
            let (_, api) = self.session().await?;
            let regions = api.list_regions().await?;
            if regions.is_empty() {
                println!("No regions yet.");
            }
            for region in regions {
                println!("- {} ({})", region.name, region.id);
            }
            return Ok(());
        }

        let (_, api) = self.admin().await?;
        match command {
            RegionCommand::List => {}
            RegionCommand::Add { name } => {
                let region = api.add_region(&RegionInput::new(&name)?).await?;
                self.say(Msg::RegionAdded);
                println!("- {} ({})", region.name, region.id);
            }
            RegionCommand::Rename { id, name } => {
                api.update_region(&id, &RegionInput::new(&name)?).await?;
                self.say(Msg::RegionUpdated);
            }
            RegionCommand::Delete { id } => {
                api.delete_region(&id).await?;
                self.say(Msg::RegionDeleted);
            }
            RegionCommand::Notify { id } => {
                api.notify_region(&id).await?;
                self.say(Msg::NotificationSent);
            }
        }
        Ok(())
    }

    async fn run_profile(&self, command: ProfileCommand) -> AppResult<()> {
        let (session, api) = self.session().await?;
        let existing = api.find_user(session.uid()).await?;

        match command {
            ProfileCommand::Show => match existing {
                Some(user) => {
                    println!("name: {}", user.full_name());
                    println!("email: {}", user.email);
                    println!("phone: {}", user.phone);
                    println!("region: {}", user.region);
                    println!("manager: {}", user.manager_name);
                    println!("status: {}", user.status);
                    if !user.status.is_approved() {
                        self.say(Msg::WaitingForApproval);
                    }
                }
                None => println!("No profile submitted yet."),
            },
            ProfileCommand::Save {
                name,
                surname,
                phone,
                region,
                manager_uid,
            } => {
                let options = profile::load_options(&api).await;
                let mut input = existing
                    .as_ref()
                    .map(ProfileInput::from_record)
                    .unwrap_or_default();
                let updates = [
                    (&mut input.name, name),
                    (&mut input.surname, surname),
                    (&mut input.phone, phone),
                    (&mut input.region, region),
                    (&mut input.manager_uid, manager_uid),
                ];
                for (field, value) in updates {
                    if let Some(value) = value {
                        *field = value;
                    }
                }
                let outcome = profile::save(&api, &session, input, &options).await?;
                self.say(outcome.message());
            }
        }
        Ok(())
    }

    fn emit(
        &self,
        rows: &[StatusRow],
        format: OutputFormat,
        out: Option<&Path>,
        scope: &str,
        now: Timestamp,
    ) -> AppResult<()> {
        let body = match format {
            OutputFormat::Table => report::render_table(rows, now).into_bytes(),
            OutputFormat::Markdown => {
                report::build_report(scope, now, self.config.overdue_window, rows).into_bytes()
            }
            OutputFormat::Csv => {
                let mut buffer = Vec::new();
                report::write_csv(rows, &mut buffer)?;
                buffer
            }
        };

        match out {
            Some(path) => {
                std::fs::write(path, body)?;
                println!("Report written to {}.", path.display());
            }
            None => std::io::stdout().write_all(&body)?,
        }
        Ok(())
    }
}

fn show(feedback: &Feedback) {
    if feedback.is_error() {
        eprintln!("{feedback}");
    } else {
        println!("{feedback}");
    }
}

async fn register_subscription(api: &ApiClient, session: &Session, path: &Path) -> AppResult<()> {
    let subscription = PushSubscription::parse(&std::fs::read(path)?)?;
    api.save_subscription(&SubscriptionRegistration {
        subscription: &subscription,
        uid: session.uid(),
    })
    .await
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "safety_checkin=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    let lang = config.lang;
    let app = App::new(config)?;

    let action = cli.command.action();
    if let Err(err) = app.run(cli.command).await {
        tracing::debug!(error = %err, "command failed");
        show(&Feedback::failure(action, &err, lang));
        if let Some(landing) = access::recovery_for(&err) {
            eprintln!("Next: {} ({})", landing.hint(), landing);
        }
        std::process::exit(1);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::Lang;

    fn action_for(args: &[&str]) -> Msg {
        let argv = std::iter::once("safety-checkin").chain(args.iter().copied());
        Cli::try_parse_from(argv).unwrap().command.action()
    }

    #[test]
    fn each_command_names_its_own_failure() {
        assert_eq!(action_for(&["respond", "safe"]), Msg::FailedToSaveResponse);
        assert_eq!(
            action_for(&["login", "--email", "a@example.com", "--password", "pw"]),
            Msg::FailedToSignIn
        );
        assert_eq!(
            action_for(&["signup", "--email", "a@example.com", "--password", "pw"]),
            Msg::FailedToCreateAccount
        );
        assert_eq!(
            action_for(&["reset-password", "--email", "a@example.com"]),
            Msg::FailedToSendPasswordReset
        );
        assert_eq!(
            action_for(&["subscribe", "--file", "sub.json"]),
            Msg::FailedToSaveSubscription
        );
        assert_eq!(action_for(&["users", "approve", "u1"]), Msg::FailedToApproveUser);
    }

    #[test]
    fn unexplained_failure_falls_back_to_command_text() {
        let err = AppError::Io(std::io::Error::other("disk full"));
        let feedback = Feedback::failure(action_for(&["respond", "unsafe"]), &err, Lang::En);
        assert_eq!(feedback, Feedback::Error("Failed to save your response.".to_string()));
    }
}
