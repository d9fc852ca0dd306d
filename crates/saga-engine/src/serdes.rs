/// Serde helper for `Option<Duration>` written as "250ms", "30s", "1m" or "1h".
pub mod serde_dur_option {
	use std::time::Duration;

	use serde::{self, Deserialize, Deserializer, Serializer};

	pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		match duration {
			Some(d) if d.subsec_millis() != 0 || d.as_secs() == 0 => {
				serializer.serialize_str(&format!("{}ms", d.as_millis()))
			},
			Some(d) => serializer.serialize_str(&format!("{}s", d.as_secs())),
			None => serializer.serialize_none(),
		}
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
	where
		D: Deserializer<'de>,
	{
		let s: Option<String> = Option::deserialize(deserializer)?;
		match s {
			Some(s) => parse(&s).map(Some).map_err(serde::de::Error::custom),
			None => Ok(None),
		}
	}

	pub(crate) fn parse(s: &str) -> Result<Duration, String> {
		let s = s.trim();
		let invalid = || format!("invalid duration format: {}", s);
		// "ms" must be checked before "s"
		if let Some(millis) = s.strip_suffix("ms") {
			let millis: u64 = millis.parse().map_err(|_| invalid())?;
			Ok(Duration::from_millis(millis))
		} else if let Some(secs) = s.strip_suffix('s') {
			let secs: u64 = secs.parse().map_err(|_| invalid())?;
			Ok(Duration::from_secs(secs))
		} else if let Some(mins) = s.strip_suffix('m') {
			let mins: u64 = mins.parse().map_err(|_| invalid())?;
			let secs = mins.checked_mul(60).ok_or_else(invalid)?;
			Ok(Duration::from_secs(secs))
		} else if let Some(hours) = s.strip_suffix('h') {
			let hours: u64 = hours.parse().map_err(|_| invalid())?;
			let secs = hours.checked_mul(3600).ok_or_else(invalid)?;
			Ok(Duration::from_secs(secs))
		} else {
			Err(invalid())
		}
	}
}
