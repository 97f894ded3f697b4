//! Персональная энергия пользователя: стихия по году рождения и число Гуа.
//! Чистые функции без ввода-вывода.

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Element {
    Wood,
    Fire,
    Earth,
    Metal,
    Water,
    Unknown,
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Element::Wood => "Wood",
            Element::Fire => "Fire",
            Element::Earth => "Earth",
            Element::Metal => "Metal",
            Element::Water => "Water",
            Element::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

const ELEMENTS: [Element; 5] = [
    Element::Wood,
    Element::Fire,
    Element::Earth,
    Element::Metal,
    Element::Water,
];

/// Стихия по году: `ELEMENTS[((year - 4) mod 10) / 2]`.
/// Упрощённая эвристика, не настоящий китайский календарь.
pub fn element_from_year(year: Option<i32>) -> Element {
    match year {
        Some(year) => {
            let index = (i64::from(year) - 4).rem_euclid(10) / 2;
            ELEMENTS[index as usize]
        }
        None => Element::Unknown,
    }
}

/// Формул Гуа две, поэтому и полов два.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    /// Строгий разбор для пошагового диалога: только `M` или `F`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "M" => Some(Gender::Male),
            "F" => Some(Gender::Female),
            _ => None,
        }
    }
}

/// Восемь сторон света.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Direction {
    N,
    NE,
    E,
    SE,
    S,
    SW,
    W,
    NW,
}

impl Direction {
    pub const ALL: [Direction; 8] = [
        Direction::N,
        Direction::NE,
        Direction::E,
        Direction::SE,
        Direction::S,
        Direction::SW,
        Direction::W,
        Direction::NW,
    ];

    pub fn parse(raw: &str) -> Option<Self> {
        let code = raw.trim().to_ascii_uppercase();
        Self::ALL.into_iter().find(|d| d.code() == code)
    }

    pub fn code(self) -> &'static str {
        match self {
            Direction::N => "N",
            Direction::NE => "NE",
            Direction::E => "E",
            Direction::SE => "SE",
            Direction::S => "S",
            Direction::SW => "SW",
            Direction::W => "W",
            Direction::NW => "NW",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

fn digit_sum(value: u32) -> u32 {
    let mut n = value;
    let mut sum = 0;
    while n > 0 {
        sum += n % 10;
        n /= 10;
    }
    sum
}

/// Число Гуа: `d = digit_sum(year) mod 9`.
/// Мужчины: `d == 0 ? 1 : 10 - d`, остальные: `d == 0 ? 8 : d + 5`.
/// Женская формула может дать значение больше 9, оно возвращается как есть.
pub fn kua_number(year: i32, gender: Gender) -> u8 {
    let d = digit_sum(year.unsigned_abs()) % 9;
    let kua = match gender {
        Gender::Male if d == 0 => 1,
        Gender::Male => 10 - d,
        Gender::Female if d == 0 => 8,
        Gender::Female => d + 5,
    };
    kua as u8
}

/// Приводит число Гуа к одной из восьми групп (5 у мужчин → 2, у женщин → 8).
fn kua_group(kua: u8, gender: Gender) -> u8 {
    let single = match kua {
        0 => 9,
        k if k > 9 => (digit_sum(u32::from(k)) % 9).max(1) as u8,
        k => k,
    };
    match (single, gender) {
        (5, Gender::Male) => 2,
        (5, Gender::Female) => 8,
        (k, _) => k,
    }
}

/// Благоприятные направления по таблицам Восточной и Западной групп.
pub fn lucky_directions(kua: u8, gender: Gender) -> Vec<Direction> {
    use Direction::*;
    match kua_group(kua, gender) {
        1 => vec![SE, E, S, N],
        2 => vec![NE, W, NW, SW],
        3 => vec![S, N, SE, E],
        4 => vec![N, S, E, SE],
        6 => vec![W, NE, SW, NW],
        7 => vec![NW, SW, NE, W],
        8 => vec![SW, NW, W, NE],
        _ => vec![E, SE, N, S],
    }
}

/// Неблагоприятные направления: все, что не вошли в благоприятные.
pub fn challenging_directions(kua: u8, gender: Gender) -> Vec<Direction> {
    let lucky = lucky_directions(kua, gender);
    Direction::ALL
        .into_iter()
        .filter(|d| !lucky.contains(d))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersonalEnergyProfile {
    pub element: Element,
    pub kua_number: Option<u8>,
    pub lucky_directions: Vec<Direction>,
    pub challenging_directions: Vec<Direction>,
}

impl PersonalEnergyProfile {
    /// Профиль без пола: известна только стихия.
    pub fn from_year(year: Option<i32>) -> Self {
        Self {
            element: element_from_year(year),
            kua_number: None,
            lucky_directions: Vec::new(),
            challenging_directions: Vec::new(),
        }
    }

    pub fn from_birth(year: i32, gender: Gender) -> Self {
        let kua = kua_number(year, gender);
        Self {
            element: element_from_year(Some(year)),
            kua_number: Some(kua),
            lucky_directions: lucky_directions(kua, gender),
            challenging_directions: challenging_directions(kua, gender),
        }
    }

    /// Есть ли что показать пользователю кроме `Unknown`.
    pub fn is_known(&self) -> bool {
        self.element != Element::Unknown || self.kua_number.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_profile_has_nothing_to_show() {
        assert!(!PersonalEnergyProfile::from_year(None).is_known());
        assert!(PersonalEnergyProfile::from_year(Some(1990)).is_known());
        assert!(PersonalEnergyProfile::from_birth(1990, Gender::Male).is_known());
    }

    #[test]
    fn kua_for_1990() {
        assert_eq!(kua_number(1990, Gender::Male), 9);
        assert_eq!(kua_number(1990, Gender::Female), 6);
    }

    #[test]
    fn kua_zero_digit_sum_branches() {
        // сумма цифр 2007 = 9, mod 9 = 0
        assert_eq!(kua_number(2007, Gender::Male), 1);
        assert_eq!(kua_number(2007, Gender::Female), 8);
    }

    #[test]
    fn female_formula_is_not_clamped() {
        // 1985: 23 mod 9 = 5 -> 10
        assert_eq!(kua_number(1985, Gender::Female), 10);
    }

    #[test]
    fn element_heuristic() {
        assert_eq!(element_from_year(Some(1990)), Element::Metal);
        assert_eq!(element_from_year(Some(1984)), Element::Wood);
        assert_eq!(element_from_year(Some(1987)), Element::Fire);
        assert_eq!(element_from_year(Some(1992)), Element::Water);
        assert_eq!(element_from_year(None), Element::Unknown);
    }

    #[test]
    fn gender_accepts_only_m_and_f() {
        assert_eq!(Gender::parse(" m "), Some(Gender::Male));
        assert_eq!(Gender::parse("X"), None);
        assert_eq!(Gender::parse("f"), Some(Gender::Female));
    }

    #[test]
    fn directions_split_into_two_groups_of_four() {
        for kua in 1..=13u8 {
            for gender in [Gender::Male, Gender::Female] {
                let lucky = lucky_directions(kua, gender);
                let bad = challenging_directions(kua, gender);
                assert_eq!(lucky.len(), 4);
                assert_eq!(bad.len(), 4);
                assert!(lucky.iter().all(|d| !bad.contains(d)));
            }
        }
    }

    #[test]
    fn profile_from_birth() {
        let profile = PersonalEnergyProfile::from_birth(1990, Gender::Male);
        assert_eq!(profile.element, Element::Metal);
        assert_eq!(profile.kua_number, Some(9));
        assert_eq!(
            profile.lucky_directions,
            vec![Direction::E, Direction::SE, Direction::N, Direction::S]
        );
    }

    #[test]
    fn direction_parsing() {
        assert_eq!(Direction::parse("ne"), Some(Direction::NE));
        assert_eq!(Direction::parse("XX"), None);
    }
}
