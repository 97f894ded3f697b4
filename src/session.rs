//! Пошаговый сбор данных рождения перед фото.
//! Каждое состояние несёт поля, собранные на предыдущих шагах, и принимает ровно одно новое.

use crate::energy::{Direction, Gender, PersonalEnergyProfile};

pub const MIN_BIRTH_YEAR: i32 = 1900;

/// Всё, что собрано к моменту ожидания фото.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BirthDetails {
    pub year: i32,
    pub month: u8,
    pub day: u8,
    pub gender: Gender,
    pub room_direction: Direction,
}

impl BirthDetails {
    /// Стихия здесь считается по году, а не остаётся заглушкой.
    pub fn profile(&self) -> PersonalEnergyProfile {
        PersonalEnergyProfile::from_birth(self.year, self.gender)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionState {
    /// Диалога нет: фото обрабатывается сразу.
    #[default]
    Idle,
    AwaitingBirthYear,
    AwaitingBirthMonth {
        year: i32,
    },
    AwaitingBirthDay {
        year: i32,
        month: u8,
    },
    AwaitingGender {
        year: i32,
        month: u8,
        day: u8,
    },
    AwaitingRoomDirection {
        year: i32,
        month: u8,
        day: u8,
        gender: Gender,
    },
    AwaitingPhoto(BirthDetails),
}

/// Что сказать пользователю после шага.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prompt {
    AskBirthYear,
    AskBirthMonth,
    AskBirthDay,
    AskGender,
    AskRoomDirection,
    AskPhoto,
    InvalidYear,
    NumericYear,
    InvalidMonth,
    NumericMonth,
    InvalidDay,
    NumericDay,
    InvalidGender,
    InvalidDirection,
    SendPhotoOrStart,
}

impl Prompt {
    pub fn text(self) -> &'static str {
        match self {
            Prompt::AskBirthYear => "Please enter your birth year (YYYY):",
            Prompt::AskBirthMonth => "Enter your birth month (1-12):",
            Prompt::AskBirthDay => "Enter your birth day (1-31):",
            Prompt::AskGender => "Enter your gender (M/F):",
            Prompt::AskRoomDirection => {
                "What direction does your room face? (N/S/E/W/NE/NW/SE/SW):"
            }
            Prompt::AskPhoto => "Please upload a photo of your space.",
            Prompt::InvalidYear => "Please enter a valid birth year (e.g., 1990).",
            Prompt::NumericYear => "Please enter a valid numeric birth year.",
            Prompt::InvalidMonth => "Please enter a valid month (1-12).",
            Prompt::NumericMonth => "Please enter a valid numeric month.",
            Prompt::InvalidDay => "Please enter a valid day (1-31).",
            Prompt::NumericDay => "Please enter a valid numeric day.",
            Prompt::InvalidGender => "Please enter 'M' for male or 'F' for female.",
            Prompt::InvalidDirection => {
                "Please enter a valid compass direction (N/S/E/W/NE/NW/SE/SW)."
            }
            Prompt::SendPhotoOrStart => {
                "Send a photo of a room for a quick analysis (add your birth year as the caption), or use /start for a personalized one."
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Поле принято, переходим в новое состояние.
    Advance(SessionState, Prompt),
    /// Ввод отклонён, состояние прежнее.
    Reprompt(Prompt),
}

fn parse_number<T: std::str::FromStr>(text: &str) -> Option<T> {
    text.trim().parse().ok()
}

/// Сначала разбор в `i64`: "300" для месяца должно давать ошибку диапазона, а не формата.
fn in_range<T: TryFrom<i64>>(
    text: &str,
    range: std::ops::RangeInclusive<i64>,
    invalid: Prompt,
    numeric: Prompt,
) -> Result<T, Prompt> {
    match parse_number::<i64>(text) {
        Some(value) if range.contains(&value) => T::try_from(value).map_err(|_| invalid),
        Some(_) => Err(invalid),
        None => Err(numeric),
    }
}

impl SessionState {
    pub fn start() -> (SessionState, Prompt) {
        (SessionState::AwaitingBirthYear, Prompt::AskBirthYear)
    }

    /// Обрабатывает текстовое сообщение в текущем состоянии.
    pub fn on_text(self, text: &str, current_year: i32) -> Transition {
        use SessionState::*;
        let step = match self {
            Idle => Err(Prompt::SendPhotoOrStart),
            AwaitingBirthYear => in_range::<i32>(
                text,
                i64::from(MIN_BIRTH_YEAR)..=i64::from(current_year),
                Prompt::InvalidYear,
                Prompt::NumericYear,
            )
            .map(|year| (AwaitingBirthMonth { year }, Prompt::AskBirthMonth)),
            AwaitingBirthMonth { year } => {
                in_range::<u8>(text, 1..=12, Prompt::InvalidMonth, Prompt::NumericMonth)
                    .map(|month| (AwaitingBirthDay { year, month }, Prompt::AskBirthDay))
            }
            AwaitingBirthDay { year, month } => {
                in_range::<u8>(text, 1..=31, Prompt::InvalidDay, Prompt::NumericDay)
                    .map(|day| (AwaitingGender { year, month, day }, Prompt::AskGender))
            }
            AwaitingGender { year, month, day } => Gender::parse(text)
                .ok_or(Prompt::InvalidGender)
                .map(|gender| {
                    (
                        AwaitingRoomDirection {
                            year,
                            month,
                            day,
                            gender,
                        },
                        Prompt::AskRoomDirection,
                    )
                }),
            AwaitingRoomDirection {
                year,
                month,
                day,
                gender,
            } => Direction::parse(text)
                .ok_or(Prompt::InvalidDirection)
                .map(|room_direction| {
                    (
                        AwaitingPhoto(BirthDetails {
                            year,
                            month,
                            day,
                            gender,
                            room_direction,
                        }),
                        Prompt::AskPhoto,
                    )
                }),
            AwaitingPhoto(_) => Err(Prompt::AskPhoto),
        };
        match step {
            Ok((next, prompt)) => Transition::Advance(next, prompt),
            Err(prompt) => Transition::Reprompt(prompt),
        }
    }

    /// Вопрос текущего шага; нужен, когда вместо ответа пришло фото.
    pub fn pending_prompt(&self) -> Option<Prompt> {
        match self {
            SessionState::Idle | SessionState::AwaitingPhoto(_) => None,
            SessionState::AwaitingBirthYear => Some(Prompt::AskBirthYear),
            SessionState::AwaitingBirthMonth { .. } => Some(Prompt::AskBirthMonth),
            SessionState::AwaitingBirthDay { .. } => Some(Prompt::AskBirthDay),
            SessionState::AwaitingGender { .. } => Some(Prompt::AskGender),
            SessionState::AwaitingRoomDirection { .. } => Some(Prompt::AskRoomDirection),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptionYear {
    Absent,
    Year(i32),
    Invalid,
}

/// Год рождения из подписи к фото: первое слово, если это число.
pub fn birth_year_from_caption(caption: Option<&str>) -> CaptionYear {
    match caption.and_then(|c| c.split_whitespace().next()) {
        None => CaptionYear::Absent,
        Some(token) => token
            .parse::<i32>()
            .map(CaptionYear::Year)
            .unwrap_or(CaptionYear::Invalid),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YEAR: i32 = 2026;

    fn advance(state: SessionState, text: &str) -> SessionState {
        match state.on_text(text, YEAR) {
            Transition::Advance(next, _) => next,
            Transition::Reprompt(prompt) => panic!("unexpected reprompt {:?} for {:?}", prompt, text),
        }
    }

    fn rejected(state: SessionState, text: &str) -> Prompt {
        match state.on_text(text, YEAR) {
            Transition::Reprompt(prompt) => prompt,
            Transition::Advance(next, _) => panic!("unexpected advance to {:?} for {:?}", next, text),
        }
    }

    #[test]
    fn birth_year_bounds() {
        let s = SessionState::AwaitingBirthYear;
        assert_eq!(rejected(s, "1850"), Prompt::InvalidYear);
        assert_eq!(rejected(s, "2999"), Prompt::InvalidYear);
        assert_eq!(rejected(s, "nineteen"), Prompt::NumericYear);
        assert_eq!(rejected(s, "99999999999"), Prompt::InvalidYear);
        assert_eq!(advance(s, "1990"), SessionState::AwaitingBirthMonth { year: 1990 });
        assert_eq!(advance(s, "2026"), SessionState::AwaitingBirthMonth { year: 2026 });
    }

    #[test]
    fn month_and_day_bounds() {
        let month = SessionState::AwaitingBirthMonth { year: 1990 };
        assert_eq!(rejected(month, "13"), Prompt::InvalidMonth);
        assert_eq!(rejected(month, "0"), Prompt::InvalidMonth);
        assert_eq!(rejected(month, "-1"), Prompt::InvalidMonth);
        assert_eq!(rejected(month, "300"), Prompt::InvalidMonth);
        assert_eq!(rejected(month, "june"), Prompt::NumericMonth);
        let day = advance(month, "12");
        assert_eq!(day, SessionState::AwaitingBirthDay { year: 1990, month: 12 });
        assert_eq!(rejected(day, "32"), Prompt::InvalidDay);
        assert_eq!(rejected(day, "256"), Prompt::InvalidDay);
        assert_eq!(
            advance(day, " 31 "),
            SessionState::AwaitingGender { year: 1990, month: 12, day: 31 }
        );
    }

    #[test]
    fn gender_and_direction() {
        let gender = SessionState::AwaitingGender { year: 1990, month: 1, day: 1 };
        assert_eq!(rejected(gender, "X"), Prompt::InvalidGender);
        assert!(matches!(advance(gender, "f"), SessionState::AwaitingRoomDirection { gender: Gender::Female, .. }));
        let direction = advance(gender, "M");
        assert_eq!(rejected(direction, "XX"), Prompt::InvalidDirection);
        let SessionState::AwaitingPhoto(details) = advance(direction, "NE") else {
            panic!("expected AwaitingPhoto");
        };
        assert_eq!(details.room_direction, Direction::NE);
        assert_eq!(details.gender, Gender::Male);
        assert_eq!(details.profile().kua_number, Some(9));
    }

    #[test]
    fn full_flow() {
        let (mut state, prompt) = SessionState::start();
        assert_eq!(prompt, Prompt::AskBirthYear);
        for input in ["1990", "6", "15", "F", "se"] {
            state = advance(state, input);
        }
        assert_eq!(
            state,
            SessionState::AwaitingPhoto(BirthDetails {
                year: 1990,
                month: 6,
                day: 15,
                gender: Gender::Female,
                room_direction: Direction::SE,
            })
        );
        assert_eq!(rejected(state, "hello"), Prompt::AskPhoto);
        assert_eq!(state.pending_prompt(), None);
    }

    #[test]
    fn idle_text_gets_hint() {
        assert_eq!(rejected(SessionState::Idle, "hi"), Prompt::SendPhotoOrStart);
    }

    #[test]
    fn caption_year() {
        assert_eq!(birth_year_from_caption(None), CaptionYear::Absent);
        assert_eq!(birth_year_from_caption(Some("   ")), CaptionYear::Absent);
        assert_eq!(birth_year_from_caption(Some("1990 my bedroom")), CaptionYear::Year(1990));
        assert_eq!(birth_year_from_caption(Some("bedroom")), CaptionYear::Invalid);
    }
}
