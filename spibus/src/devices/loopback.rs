use crate::{Bus, Frame, FrameError, SlaveDevice, SpiConfig};

/// answers every frame with the word received in the previous one
///
/// holds 0 until the first frame completes
#[derive(Debug, Clone)]
pub struct Loopback {
    config: SpiConfig,
    word: u64,
}

impl Loopback {
    pub fn new(config: SpiConfig) -> Self {
        Self { config, word: 0 }
    }

    /// the word that will be sent in the next frame
    pub fn contents(&self) -> u64 {
        self.word
    }
}

impl SlaveDevice for Loopback {
    fn config(&self) -> &SpiConfig {
        &self.config
    }

    async fn transaction<B: Bus>(&mut self, frame: &Frame<'_, B>) -> Result<(), FrameError> {
        frame.started().await;
        let rx = frame
            .shift(self.config.word_width(), Some(self.word))
            .await?;
        frame.ended().await?;

        self.word = rx;
        Ok(())
    }
}
