//! Arithmetic captcha gating registration.
//!
//! The challenge never touches the database. It travels to the client as the
//! `captcha_answer` cookie (base64 of JSON) holding the question, a SHA-256
//! of the answer and the expiry. Anyone can brute-force ten candidate digits
//! against that hash offline, so this is friction against naive form
//! spammers and nothing more.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const CAPTCHA_COOKIE: &str = "captcha_answer";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Div,
}

const OPERATORS: [Operator; 4] = [Operator::Add, Operator::Sub, Operator::Mul, Operator::Div];

impl Operator {
    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Add => "+",
            Operator::Sub => "-",
            Operator::Mul => "×",
            Operator::Div => "÷",
        }
    }

    /// `None` for division by zero or inexact division.
    pub fn apply(&self, a: i32, b: i32) -> Option<i32> {
        match self {
            Operator::Add => Some(a + b),
            Operator::Sub => Some(a - b),
            Operator::Mul => Some(a * b),
            Operator::Div if b != 0 && a % b == 0 => Some(a / b),
            Operator::Div => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    pub question: String,
    pub answer_hash: String,
    /// Unix timestamp (seconds)
    pub expires_at: i64,
}

impl Challenge {
    pub fn new(question: impl Into<String>, answer: u8, expires_at: DateTime<Utc>) -> Self {
        Self {
            question: question.into(),
            answer_hash: hash_answer(&answer.to_string()),
            expires_at: expires_at.timestamp(),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() > self.expires_at
    }

    /// Cookie value: base64 of the JSON-encoded challenge.
    pub fn encode_cookie(&self) -> Result<String, serde_json::Error> {
        Ok(STANDARD.encode(serde_json::to_vec(self)?))
    }

    pub fn decode_cookie(value: &str) -> Result<Self, CaptchaError> {
        let bytes = STANDARD
            .decode(value.trim())
            .map_err(|_| CaptchaError::Malformed)?;
        serde_json::from_slice(&bytes).map_err(|_| CaptchaError::Malformed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptchaError {
    #[error("Please answer the captcha")]
    EmptyAnswer,

    #[error("Captcha expired, please try again")]
    Expired,

    #[error("Incorrect captcha answer")]
    Incorrect,

    #[error("Captcha missing, reload the registration form")]
    Missing,

    #[error("Captcha could not be read, reload the registration form")]
    Malformed,
}

pub fn hash_answer(answer: &str) -> String {
    hex::encode(Sha256::digest(answer.as_bytes()))
}

#[derive(Debug, Clone, Copy)]
pub struct CaptchaEngine {
    ttl: Duration,
}

impl CaptchaEngine {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn generate_challenge(&self) -> Challenge {
        self.generate_challenge_at(Utc::now())
    }

    pub fn generate_challenge_at(&self, now: DateTime<Utc>) -> Challenge {
        let mut rng = rand::thread_rng();
        let (a, op, b, answer) = pick_problem(&mut rng);

        tracing::debug!(operator = op.symbol(), "Generated captcha challenge");
        Challenge::new(
            format!("{} {} {} = ?", a, op.symbol(), b),
            answer,
            now + self.ttl,
        )
    }

    pub fn verify_challenge(&self, submitted: &str, challenge: &Challenge) -> bool {
        self.check(submitted, challenge).is_ok()
    }

    pub fn check(&self, submitted: &str, challenge: &Challenge) -> Result<(), CaptchaError> {
        self.check_at(submitted, challenge, Utc::now())
    }

    /// Nothing marks a challenge as used, so a correct answer keeps passing
    /// until `expires_at`.
    pub fn check_at(
        &self,
        submitted: &str,
        challenge: &Challenge,
        now: DateTime<Utc>,
    ) -> Result<(), CaptchaError> {
        let submitted = submitted.trim();
        if submitted.is_empty() {
            return Err(CaptchaError::EmptyAnswer);
        }

        if challenge.is_expired(now) {
            return Err(CaptchaError::Expired);
        }

        if hash_answer(submitted) != challenge.answer_hash {
            return Err(CaptchaError::Incorrect);
        }

        Ok(())
    }
}

/// Pick an operator, then redraw operands until the result is a single digit.
fn pick_problem<R: Rng>(rng: &mut R) -> (i32, Operator, i32, u8) {
    let op = OPERATORS[rng.gen_range(0..OPERATORS.len())];
    loop {
        let a = rng.gen_range(0..=9);
        let b = rng.gen_range(0..=9);
        if let Some(result) = op.apply(a, b) {
            if (0..=9).contains(&result) {
                return (a, op, b, result as u8);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> CaptchaEngine {
        CaptchaEngine::new(Duration::seconds(60))
    }

    /// Recompute the answer from the rendered question.
    fn solve(question: &str) -> i32 {
        let parts: Vec<&str> = question.split_whitespace().collect();
        assert_eq!(parts.len(), 5, "unexpected question shape: {}", question);
        let a: i32 = parts[0].parse().unwrap();
        let b: i32 = parts[2].parse().unwrap();
        let op = OPERATORS
            .iter()
            .find(|op| op.symbol() == parts[1])
            .unwrap();
        op.apply(a, b).unwrap()
    }

    #[test]
    fn operator_rejects_bad_division() {
        assert_eq!(Operator::Div.apply(7, 0), None);
        assert_eq!(Operator::Div.apply(7, 2), None);
        assert_eq!(Operator::Div.apply(8, 2), Some(4));
        assert_eq!(Operator::Div.apply(0, 3), Some(0));
    }

    #[test]
    fn generated_answers_are_single_digits() {
        let engine = engine();
        let now = Utc::now();
        for _ in 0..500 {
            let challenge = engine.generate_challenge_at(now);
            let answer = solve(&challenge.question);
            assert!((0..=9).contains(&answer), "{}", challenge.question);
            assert_eq!(challenge.answer_hash, hash_answer(&answer.to_string()));
            assert!(challenge.question.ends_with("= ?"));
        }
    }

    #[test]
    fn generated_challenge_expires_after_ttl() {
        let now = Utc::now();
        let challenge = engine().generate_challenge_at(now);
        assert_eq!(challenge.expires_at, (now + Duration::seconds(60)).timestamp());
    }

    #[test]
    fn all_operators_eventually_appear() {
        let engine = engine();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..1000 {
            let q = engine.generate_challenge().question;
            seen.insert(q.split_whitespace().nth(1).unwrap().to_string());
        }
        assert_eq!(seen.len(), 4, "saw only {:?}", seen);
    }

    #[test]
    fn answer_hash_does_not_contain_plaintext() {
        let challenge = Challenge::new("4 + 3 = ?", 7, Utc::now());
        assert_eq!(challenge.answer_hash.len(), 64);
        assert_ne!(challenge.answer_hash, "7");
    }

    #[test]
    fn four_plus_three_scenario() {
        let engine = engine();
        let issued = Utc::now();
        let challenge = Challenge::new("4 + 3 = ?", 7, issued + Duration::seconds(60));

        assert!(engine.check_at("7", &challenge, issued).is_ok());
        assert_eq!(
            engine.check_at("7", &challenge, issued + Duration::seconds(61)),
            Err(CaptchaError::Expired)
        );
        assert_eq!(
            engine.check_at("8", &challenge, issued),
            Err(CaptchaError::Incorrect)
        );
        assert!(engine
            .check_at("8", &challenge, issued + Duration::seconds(61))
            .is_err());
    }

    #[test]
    fn answer_at_exact_deadline_still_passes() {
        let engine = engine();
        let deadline = Utc::now();
        let challenge = Challenge::new("2 × 3 = ?", 6, deadline);
        assert!(engine.check_at("6", &challenge, deadline).is_ok());
    }

    #[test]
    fn verify_challenge_is_boolean_view_of_check() {
        let engine = engine();
        let challenge = Challenge::new("4 + 3 = ?", 7, Utc::now() + Duration::seconds(60));
        assert!(engine.verify_challenge("7", &challenge));
        assert!(engine.verify_challenge(" 7 ", &challenge));
        assert!(!engine.verify_challenge("8", &challenge));
        assert!(!engine.verify_challenge("seven", &challenge));
    }

    #[test]
    fn empty_answer_is_input_error() {
        let challenge = Challenge::new("1 + 1 = ?", 2, Utc::now() + Duration::seconds(60));
        assert_eq!(
            engine().check("  ", &challenge),
            Err(CaptchaError::EmptyAnswer)
        );
    }

    #[test]
    fn correct_answer_can_be_replayed_before_expiry() {
        // No single-use tracking exists: the same cookie keeps verifying.
        let engine = engine();
        let challenge = Challenge::new("9 ÷ 3 = ?", 3, Utc::now() + Duration::seconds(60));
        for _ in 0..3 {
            assert!(engine.verify_challenge("3", &challenge));
        }
    }

    #[test]
    fn cookie_codec_preserves_challenge() {
        let challenge = Challenge::new("5 - 2 = ?", 3, Utc::now());
        let encoded = challenge.encode_cookie().unwrap();
        assert!(!encoded.contains(';'));
        assert_eq!(Challenge::decode_cookie(&encoded).unwrap(), challenge);
    }

    #[test]
    fn tampered_cookie_is_malformed() {
        assert_eq!(
            Challenge::decode_cookie("not base64!!"),
            Err(CaptchaError::Malformed)
        );
        let not_json = STANDARD.encode(b"hello");
        assert_eq!(
            Challenge::decode_cookie(&not_json),
            Err(CaptchaError::Malformed)
        );
    }

    #[test]
    fn offline_brute_force_recovers_answer() {
        // Documents the known weakness of an unkeyed hash over ten digits.
        let challenge = Challenge::new("3 × 3 = ?", 9, Utc::now());
        let recovered = (0..=9)
            .find(|d: &u8| hash_answer(&d.to_string()) == challenge.answer_hash)
            .unwrap();
        assert_eq!(recovered, 9);
    }
}
