//! User-facing texts and command literals (Russian locale).
//!
//! Step prompts come from a per-flavor template table: single registrations
//! address "you", team registrations address "participant N". Templates use
//! `{n}` for the 1-based participant number.

use super::model::{RegistrationType, Step, UserData};

/// Command literals. Matched exactly (after trimming surrounding whitespace).
pub mod tokens {
    pub const START: &str = "/start";
    pub const SINGLE: &str = "1";
    pub const TEAM: &str = "2";
    pub const CANCEL: &str = "/cancel";
    pub const YES: &str = "Да";
    pub const NO: &str = "Нет";
}

pub const WELCOME: &str = "Здравствуйте! Это бот регистрации на мероприятие.\n\
Выберите тип регистрации:\n\
1 — одиночная регистрация\n\
2 — командная регистрация (до 3 участников)\n\n\
Чтобы отменить регистрацию, отправьте /cancel.";

pub const INVALID_AGE: &str = "Пожалуйста, введите корректный возраст (целое число).";

pub const PHONE_TAKEN: &str =
    "Этот номер телефона уже зарегистрирован. Введите другой номер:";

pub const ADD_ANOTHER: &str = "Добавить ещё одного участника?";

pub const CANCELLED: &str = "Регистрация отменена.";

pub const TRANSIENT_FAILURE: &str =
    "Не удалось сохранить данные. Пожалуйста, отправьте последний ответ ещё раз.";

/// A phone number collected earlier was registered from another chat
/// before this registration was saved.
pub const PHONE_CONFLICT: &str = "Один из номеров телефона уже успел зарегистрироваться. \
Отправьте /cancel и пройдите регистрацию заново.";

/// Prompt templates for one registration flavor.
struct PromptTemplates {
    first_name: &'static str,
    last_name: &'static str,
    age: &'static str,
    phone_number: &'static str,
}

const SINGLE_PROMPTS: PromptTemplates = PromptTemplates {
    first_name: "Введите ваше имя:",
    last_name: "Введите вашу фамилию:",
    age: "Введите ваш возраст:",
    phone_number: "Введите ваш номер телефона:",
};

const TEAM_PROMPTS: PromptTemplates = PromptTemplates {
    first_name: "Введите имя участника {n}:",
    last_name: "Введите фамилию участника {n}:",
    age: "Введите возраст участника {n}:",
    phone_number: "Введите номер телефона участника {n}:",
};

fn templates(kind: RegistrationType) -> &'static PromptTemplates {
    match kind {
        RegistrationType::Single => &SINGLE_PROMPTS,
        RegistrationType::Team => &TEAM_PROMPTS,
    }
}

/// Prompt asking for the field collected at `step`.
pub fn step_prompt(kind: RegistrationType, step: Step, participant: usize) -> String {
    let t = templates(kind);
    let template = match step {
        Step::FirstName => t.first_name,
        Step::LastName => t.last_name,
        Step::Age => t.age,
        Step::PhoneNumber => t.phone_number,
        Step::AwaitingMore => return ADD_ANOTHER.to_string(),
    };
    template.replace("{n}", &participant.to_string())
}

/// Confirmation sent after a registration has been persisted.
pub fn success(kind: RegistrationType, users: &[UserData]) -> String {
    let names = users
        .iter()
        .map(|u| format!("• {} {}", u.first_name, u.last_name))
        .collect::<Vec<_>>()
        .join("\n");
    match kind {
        RegistrationType::Single => format!("Регистрация завершена! Спасибо.\n{names}"),
        RegistrationType::Team => format!(
            "Командная регистрация завершена! Участников: {}.\n{names}",
            users.len()
        ),
    }
}
