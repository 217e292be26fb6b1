use std::time::Duration;

use crate::error::PoolError;

/// Runtime-mutable pool configuration.
///
/// A `Duration` of zero means "disabled" for every field except
/// `max_wait_time`, where it means "wait indefinitely" — both spellings
/// of "no limit", matching the source contract for each field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoolConfig {
    pub(crate) max_active: u32,
    pub(crate) min_active: u32,
    pub(crate) max_wait_time: Duration,
    pub(crate) validation_interval: Duration,
    pub(crate) max_idle_time: Duration,
    pub(crate) max_life_time: Duration,
    pub(crate) test_on_borrow: bool,
    pub(crate) test_on_return: bool,
    pub(crate) reset_connections: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            max_active: 2,
            min_active: 0,
            max_wait_time: Duration::from_secs_f64(5.0),
            validation_interval: Duration::from_secs_f64(5.0),
            max_idle_time: Duration::from_secs(60),
            max_life_time: Duration::ZERO,
            test_on_borrow: true,
            test_on_return: true,
            reset_connections: false,
        }
    }
}

fn duration_from_secs<E: std::error::Error + 'static>(
    secs: f64,
    field: &'static str,
) -> Result<Duration, PoolError<E>> {
    if !secs.is_finite() || secs < 0.0 {
        return Err(PoolError::InvalidConfiguration(field));
    }
    Ok(Duration::from_secs_f64(secs))
}

impl PoolConfig {
    /// Returns a [`PoolConfigBuilder`] seeded with the defaults.
    pub fn builder() -> PoolConfigBuilder {
        PoolConfigBuilder::default()
    }

    pub fn max_active(&self) -> u32 {
        self.max_active
    }

    pub fn min_active(&self) -> u32 {
        self.min_active
    }

    pub fn max_wait_time(&self) -> Duration {
        self.max_wait_time
    }

    pub fn validation_interval(&self) -> Duration {
        self.validation_interval
    }

    pub fn max_idle_time(&self) -> Duration {
        self.max_idle_time
    }

    pub fn max_life_time(&self) -> Duration {
        self.max_life_time
    }

    pub fn test_on_borrow(&self) -> bool {
        self.test_on_borrow
    }

    pub fn test_on_return(&self) -> bool {
        self.test_on_return
    }

    pub fn reset_connections(&self) -> bool {
        self.reset_connections
    }

    /// Sets `max_active`, clamping `min_active` down to match if it would
    /// otherwise exceed the new cap (invariant I4).
    pub(crate) fn set_max_active<E: std::error::Error + 'static>(
        &mut self,
        max_active: u32,
    ) -> Result<(), PoolError<E>> {
        if max_active == 0 {
            return Err(PoolError::InvalidConfiguration("max_active"));
        }
        self.max_active = max_active;
        if self.min_active > self.max_active {
            self.min_active = self.max_active;
        }
        Ok(())
    }

    /// Sets `min_active`, clamping to `max_active` if it would otherwise
    /// exceed the cap (invariant I4).
    pub(crate) fn set_min_active<E: std::error::Error + 'static>(
        &mut self,
        min_active: u32,
    ) -> Result<(), PoolError<E>> {
        self.min_active = min_active.min(self.max_active);
        Ok(())
    }

    pub(crate) fn set_max_wait_time<E: std::error::Error + 'static>(
        &mut self,
        secs: f64,
    ) -> Result<(), PoolError<E>> {
        self.max_wait_time = duration_from_secs(secs, "max_wait_time")?;
        Ok(())
    }

    pub(crate) fn set_validation_interval<E: std::error::Error + 'static>(
        &mut self,
        secs: f64,
    ) -> Result<(), PoolError<E>> {
        self.validation_interval = duration_from_secs(secs, "validation_interval")?;
        Ok(())
    }

    pub(crate) fn set_max_idle_time<E: std::error::Error + 'static>(
        &mut self,
        secs: f64,
    ) -> Result<(), PoolError<E>> {
        self.max_idle_time = duration_from_secs(secs, "max_idle_time")?;
        Ok(())
    }

    pub(crate) fn set_max_life_time<E: std::error::Error + 'static>(
        &mut self,
        secs: f64,
    ) -> Result<(), PoolError<E>> {
        self.max_life_time = duration_from_secs(secs, "max_life_time")?;
        Ok(())
    }

    pub(crate) fn set_test_on_borrow(&mut self, value: bool) {
        self.test_on_borrow = value;
    }

    pub(crate) fn set_test_on_return(&mut self, value: bool) {
        self.test_on_return = value;
    }

    pub(crate) fn set_reset_connections(&mut self, value: bool) {
        self.reset_connections = value;
    }
}

/// A builder for [`PoolConfig`], in the style of the teacher's connection
/// pool builder: consumed once to produce an immutable starting
/// configuration, after which the pool exposes its own runtime setters.
#[derive(Debug, Clone)]
pub struct PoolConfigBuilder {
    config: PoolConfig,
}

impl Default for PoolConfigBuilder {
    fn default() -> Self {
        PoolConfigBuilder {
            config: PoolConfig::default(),
        }
    }
}

impl PoolConfigBuilder {
    /// Hard cap on total connections. Must be at least 1.
    pub fn max_active(mut self, max_active: u32) -> Self {
        assert!(max_active >= 1, "max_active must be at least 1");
        self.config.max_active = max_active;
        self
    }

    /// Warm connections to maintain. Clamped to `max_active`.
    pub fn min_active(mut self, min_active: u32) -> Self {
        self.config.min_active = min_active;
        self
    }

    /// Borrow timeout in seconds; 0 disables (wait indefinitely).
    pub fn max_wait_time(mut self, secs: f64) -> Self {
        assert!(secs >= 0.0, "max_wait_time must not be negative");
        self.config.max_wait_time = Duration::from_secs_f64(secs);
        self
    }

    /// Validator period in seconds; 0 disables the validator.
    pub fn validation_interval(mut self, secs: f64) -> Self {
        assert!(secs >= 0.0, "validation_interval must not be negative");
        self.config.validation_interval = Duration::from_secs_f64(secs);
        self
    }

    /// Idle eviction threshold in seconds; 0 disables.
    pub fn max_idle_time(mut self, secs: f64) -> Self {
        assert!(secs >= 0.0, "max_idle_time must not be negative");
        self.config.max_idle_time = Duration::from_secs_f64(secs);
        self
    }

    /// Age eviction threshold in seconds; 0 disables.
    pub fn max_life_time(mut self, secs: f64) -> Self {
        assert!(secs >= 0.0, "max_life_time must not be negative");
        self.config.max_life_time = Duration::from_secs_f64(secs);
        self
    }

    /// Whether to drop dead connections on borrow. Defaults to true.
    pub fn test_on_borrow(mut self, value: bool) -> Self {
        self.config.test_on_borrow = value;
        self
    }

    /// Whether to drop dead connections on return. Defaults to true.
    pub fn test_on_return(mut self, value: bool) -> Self {
        self.config.test_on_return = value;
        self
    }

    /// Whether to call `reset()` on borrow. Defaults to false.
    pub fn reset_connections(mut self, value: bool) -> Self {
        self.config.reset_connections = value;
        self
    }

    /// Finalizes the configuration, clamping `min_active` to `max_active`.
    pub fn build(mut self) -> PoolConfig {
        if self.config.min_active > self.config.max_active {
            self.config.min_active = self.config.max_active;
        }
        self.config
    }
}
