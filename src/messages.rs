use std::fmt;
use std::str::FromStr;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lang {
    #[default]
    En,
    Uk,
}

impl FromStr for Lang {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "en" => Ok(Lang::En),
            "uk" | "ua" => Ok(Lang::Uk),
            other => Err(format!("unsupported language `{other}` (expected en or uk)")),
        }
    }
}

/// Every user-facing message the client can show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Msg {
    PleaseSelectResponse,
    ResponseSaved,
    FailedToSaveResponse,
    SubmissionInProgress,
    FailedToLoadData,
    UserRoleUpdated,
    FailedToUpdateUserRole,
    UserFieldsUpdated,
    FailedToUpdateUserFields,
    UserApproved,
    FailedToApproveUser,
    UserDeleted,
    FailedToDeleteUser,
    RegionAdded,
    FailedToAddRegion,
    RegionUpdated,
    FailedToUpdateRegion,
    RegionDeleted,
    FailedToDeleteRegion,
    RegionNameRequired,
    NotificationSent,
    FailedToSendNotification,
    PersonalInfoSaved,
    WaitingForApproval,
    FailedToSavePersonalInfo,
    NameRequired,
    SurnameRequired,
    PhoneRequired,
    SelectRegion,
    SelectManager,
    EmailRequired,
    PasswordRequired,
    VerifyYourEmail,
    VerificationEmailSent,
    FailedToSendVerificationEmail,
    PasswordResetEmailSent,
    SignedIn,
    FailedToSignIn,
    FailedToCreateAccount,
    FailedToSendPasswordReset,
    SignedOut,
    FailedToSignOut,
    SubscriptionSaved,
    FailedToSaveSubscription,
    FailedToOpenNotification,
    AuthenticationRequired,
    EmailNotVerified,
    EmailNotApproved,
    AdminRequired,
    RemoteUnavailable,
    InvalidTimestamp,
    Conflict,
}

impl Msg {
    pub fn text(self, lang: Lang) -> &'static str {
        match lang {
            Lang::En => self.en(),
            Lang::Uk => self.uk(),
        }
    }

    fn en(self) -> &'static str {
        match self {
            Msg::PleaseSelectResponse => "Please select a response.",
            Msg::ResponseSaved => "Your response has been saved.",
            Msg::FailedToSaveResponse => "Failed to save your response.",
            Msg::SubmissionInProgress => "Your previous response is still being sent.",
            Msg::FailedToLoadData => "Failed to load data.",
            Msg::UserRoleUpdated => "User role updated.",
            Msg::FailedToUpdateUserRole => "Failed to update user role.",
            Msg::UserFieldsUpdated => "User details updated.",
            Msg::FailedToUpdateUserFields => "Failed to update user details.",
            Msg::UserApproved => "User approved.",
            Msg::FailedToApproveUser => "Failed to approve user.",
            Msg::UserDeleted => "User deleted.",
            Msg::FailedToDeleteUser => "Failed to delete user.",
            Msg::RegionAdded => "Region added.",
            Msg::FailedToAddRegion => "Failed to add region.",
            Msg::RegionUpdated => "Region updated.",
            Msg::FailedToUpdateRegion => "Failed to update region.",
            Msg::RegionDeleted => "Region deleted.",
            Msg::FailedToDeleteRegion => "Failed to delete region.",
            Msg::RegionNameRequired => "Region name is required.",
            Msg::NotificationSent => "Notification sent.",
            Msg::FailedToSendNotification => "Failed to send notification.",
            Msg::PersonalInfoSaved => "Personal information saved.",
            Msg::WaitingForApproval => "Waiting for an operator to approve your access.",
            Msg::FailedToSavePersonalInfo => "Failed to save personal information.",
            Msg::NameRequired => "Name is required.",
            Msg::SurnameRequired => "Surname is required.",
            Msg::PhoneRequired => "Phone is required.",
            Msg::SelectRegion => "Please select a region.",
            Msg::SelectManager => "Please select a manager.",
            Msg::EmailRequired => "Please enter your email.",
            Msg::PasswordRequired => "Please enter your password.",
            Msg::VerifyYourEmail => "Account created. Please verify your email before signing in.",
            Msg::VerificationEmailSent => "Verification email sent.",
            Msg::FailedToSendVerificationEmail => "Failed to send verification email.",
            Msg::PasswordResetEmailSent => "Password reset email sent.",
            Msg::SignedIn => "Signed in.",
            Msg::FailedToSignIn => "Failed to sign in.",
            Msg::FailedToCreateAccount => "Failed to create account.",
            Msg::FailedToSendPasswordReset => "Failed to send password reset email.",
            Msg::SignedOut => "Signed out.",
            Msg::FailedToSignOut => "Failed to sign out.",
            Msg::SubscriptionSaved => "Notifications enabled.",
            Msg::FailedToSaveSubscription => "Failed to enable notifications.",
            Msg::FailedToOpenNotification => "Failed to open notification.",
            Msg::AuthenticationRequired => "Please sign in.",
            Msg::EmailNotVerified => "Your email is not verified.",
            Msg::EmailNotApproved => "Your account has not been approved yet.",
            Msg::AdminRequired => "This action requires an administrator.",
            Msg::RemoteUnavailable => "The service is unavailable. Please try again later.",
            Msg::InvalidTimestamp => "The status data contains an invalid date.",
            Msg::Conflict => "The record was changed by someone else. Reload and try again.",
        }
    }

    fn uk(self) -> &'static str {
        match self {
            Msg::PleaseSelectResponse => "Будь ласка, оберіть відповідь.",
            Msg::ResponseSaved => "Вашу відповідь збережено.",
            Msg::FailedToSaveResponse => "Не вдалося зберегти вашу відповідь.",
            Msg::SubmissionInProgress => "Попередня відповідь ще надсилається.",
            Msg::FailedToLoadData => "Не вдалося завантажити дані.",
            Msg::UserRoleUpdated => "Роль користувача оновлено.",
            Msg::FailedToUpdateUserRole => "Не вдалося оновити роль користувача.",
            Msg::UserFieldsUpdated => "Дані користувача оновлено.",
            Msg::FailedToUpdateUserFields => "Не вдалося оновити дані користувача.",
            Msg::UserApproved => "Користувача підтверджено.",
            Msg::FailedToApproveUser => "Не вдалося підтвердити користувача.",
            Msg::UserDeleted => "Користувача видалено.",
            Msg::FailedToDeleteUser => "Не вдалося видалити користувача.",
            Msg::RegionAdded => "Регіон додано.",
            Msg::FailedToAddRegion => "Не вдалося додати регіон.",
            Msg::RegionUpdated => "Регіон оновлено.",
            Msg::FailedToUpdateRegion => "Не вдалося оновити регіон.",
            Msg::RegionDeleted => "Регіон видалено.",
            Msg::FailedToDeleteRegion => "Не вдалося видалити регіон.",
            Msg::RegionNameRequired => "Вкажіть назву регіону.",
            Msg::NotificationSent => "Сповіщення надіслано.",
            Msg::FailedToSendNotification => "Не вдалося надіслати сповіщення.",
            Msg::PersonalInfoSaved => "Особисту інформацію збережено.",
            Msg::WaitingForApproval => "Очікуйте, поки оператор підтвердить ваш доступ.",
            Msg::FailedToSavePersonalInfo => "Не вдалося зберегти особисту інформацію.",
            Msg::NameRequired => "Вкажіть ім'я.",
            Msg::SurnameRequired => "Вкажіть прізвище.",
            Msg::PhoneRequired => "Вкажіть телефон.",
            Msg::SelectRegion => "Оберіть регіон.",
            Msg::SelectManager => "Оберіть керівника.",
            Msg::EmailRequired => "Введіть вашу електронну пошту.",
            Msg::PasswordRequired => "Введіть пароль.",
            Msg::VerifyYourEmail => "Обліковий запис створено. Підтвердьте електронну пошту перед входом.",
            Msg::VerificationEmailSent => "Лист для підтвердження надіслано.",
            Msg::FailedToSendVerificationEmail => "Не вдалося надіслати лист для підтвердження.",
            Msg::PasswordResetEmailSent => "Лист для скидання пароля надіслано.",
            Msg::SignedIn => "Вхід виконано.",
            Msg::FailedToSignIn => "Не вдалося увійти.",
            Msg::FailedToCreateAccount => "Не вдалося створити обліковий запис.",
            Msg::FailedToSendPasswordReset => "Не вдалося надіслати лист для скидання пароля.",
            Msg::SignedOut => "Вихід виконано.",
            Msg::FailedToSignOut => "Не вдалося вийти.",
            Msg::SubscriptionSaved => "Сповіщення увімкнено.",
            Msg::FailedToSaveSubscription => "Не вдалося увімкнути сповіщення.",
            Msg::FailedToOpenNotification => "Не вдалося відкрити сповіщення.",
            Msg::AuthenticationRequired => "Будь ласка, увійдіть.",
            Msg::EmailNotVerified => "Вашу електронну пошту не підтверджено.",
            Msg::EmailNotApproved => "Ваш обліковий запис ще не підтверджено.",
            Msg::AdminRequired => "Ця дія доступна лише адміністратору.",
            Msg::RemoteUnavailable => "Сервіс недоступний. Спробуйте пізніше.",
            Msg::InvalidTimestamp => "Дані статусу містять некоректну дату.",
            Msg::Conflict => "Запис змінив хтось інший. Оновіть дані та спробуйте ще раз.",
        }
    }
}

/// Transient result of one user action, shown once and replaced by the next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Feedback {
    Success(String),
    Error(String),
}

impl Feedback {
    pub fn success(msg: Msg, lang: Lang) -> Self {
        Feedback::Success(msg.text(lang).to_string())
    }

    /// Failure text for `action`. Errors that carry their own meaning for the
    /// user (session, approval, validation) win over the action's generic text.
    pub fn failure(action: Msg, err: &AppError, lang: Lang) -> Self {
        let text = match err.message() {
            Some(own) => own.text(lang).to_string(),
            None => match err {
                AppError::Remote { message, .. } if !message.is_empty() => {
                    format!("{} ({message})", action.text(lang))
                }
                _ => action.text(lang).to_string(),
            },
        };
        Feedback::Error(text)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Feedback::Error(_))
    }
}

impl fmt::Display for Feedback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Feedback::Success(text) | Feedback::Error(text) => f.write_str(text),
        }
    }
}
