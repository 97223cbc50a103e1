use serde::{Deserialize, Serialize};

use crate::{
    AbTestCodec, AbTestHandler, CookieSettings, Dispatcher, HandlerMode, PercentageRandomiser,
    Randomiser,
};

/// Configuration for one A/B test.
///
/// Can be built in code or deserialized from a service's configuration:
///
/// ```
/// # use ab_cookies::AbTestConfig;
/// let config: AbTestConfig = serde_json::from_str(r#"{
///     "test_id": "search",
///     "domain": "example.com",
///     "percentage": 10,
///     "exit_param": "exit-new-search"
/// }"#).unwrap();
/// assert_eq!(config.configured_percentage(), 10);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbTestConfig {
    pub(crate) test_id: String,
    pub(crate) domain: String,
    #[serde(default)]
    pub(crate) percentage: u8,
    #[serde(default)]
    pub(crate) exit_param: Option<String>,
    #[serde(default = "default_enabled")]
    pub(crate) enabled: bool,
    #[serde(default)]
    pub(crate) cookie_settings: CookieSettings,
}

fn default_enabled() -> bool {
    true
}

impl AbTestConfig {
    /// An enabled test with nobody on the new variant and no exit parameter.
    ///
    /// ```
    /// # use ab_cookies::AbTestConfig;
    /// let mut config = AbTestConfig::new("search", "example.com");
    /// config.percentage(25).exit_param("exit-new-search");
    /// ```
    pub fn new(test_id: impl Into<String>, domain: impl Into<String>) -> Self {
        AbTestConfig {
            test_id: test_id.into(),
            domain: domain.into(),
            percentage: 0,
            exit_param: None,
            enabled: true,
            cookie_settings: CookieSettings::default(),
        }
    }

    /// Share of fresh assignments, in percent, that go to the new variant. Capped at 100.
    pub fn percentage(&mut self, percentage: u8) -> &mut Self {
        self.percentage = percentage.min(100);
        self
    }

    /// Query parameter that pins a client to the old variant when present.
    pub fn exit_param(&mut self, name: impl Into<String>) -> &mut Self {
        self.exit_param = Some(name.into());
        self
    }

    /// Whether the test is running. A disabled test purges its cookie entry and always serves
    /// the new variant.
    pub fn enabled(&mut self, enabled: bool) -> &mut Self {
        self.enabled = enabled;
        self
    }

    /// Attributes for written cookies. Use [`CookieSettings::insecure`] only for local
    /// development.
    pub fn cookie_settings(&mut self, settings: CookieSettings) -> &mut Self {
        self.cookie_settings = settings;
        self
    }

    #[allow(missing_docs)]
    pub fn test_id(&self) -> &str {
        &self.test_id
    }

    /// Configured share for the new variant, capped at 100.
    pub fn configured_percentage(&self) -> u8 {
        self.percentage.min(100)
    }

    /// Mode a handler built from this configuration runs in.
    pub fn mode(&self) -> HandlerMode {
        if self.enabled {
            HandlerMode::Split
        } else {
            HandlerMode::Purge
        }
    }

    /// Dispatcher assigning fresh clients with a [`PercentageRandomiser`].
    pub fn to_dispatcher(&self) -> Dispatcher {
        self.to_dispatcher_with_randomiser(PercentageRandomiser::new(self.configured_percentage()))
    }

    /// Dispatcher assigning fresh clients with `randomiser`.
    pub fn to_dispatcher_with_randomiser(
        &self,
        randomiser: impl Randomiser + Send + Sync + 'static,
    ) -> Dispatcher {
        Dispatcher::new(
            self.test_id.clone(),
            self.exit_param.clone(),
            AbTestCodec::new(self.domain.clone(), self.cookie_settings),
            randomiser,
        )
    }

    /// Handler routing requests between `new` and `old`.
    pub fn to_handler<N, O>(&self, new: N, old: O) -> AbTestHandler<N, O> {
        AbTestHandler::new(self.mode(), self.to_dispatcher(), new, old)
    }
}
