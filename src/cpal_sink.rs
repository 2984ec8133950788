//! Desktop stand-in for the embedded I2S/DAC bus: a [`cpal`] output stream
//! fed from a small `rtrb` ring. `write_block` is the one blocking point on
//! the audio task, same as a real DMA write would be — it blocks on ring
//! backpressure rather than on a hardware FIFO.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use rtrb::{Consumer, Producer, RingBuffer};

use crate::config::{BLOCK_FRAMES, SAMPLE_RATE};
use crate::error::{EngineError, EngineResult};
use crate::output::AudioSink;

/// Blocks per ring; two is enough headroom for scheduling jitter without
/// adding audible latency.
const RING_BLOCKS: usize = 4;

pub struct CpalSink {
    producer: Producer<i16>,
    _stream: cpal::Stream,
}

impl CpalSink {
    pub fn build_default_output() -> EngineResult<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(EngineError::InvalidParameter("no default audio output device"))?;
        let config = cpal::StreamConfig {
            channels: 2,
            sample_rate: cpal::SampleRate(SAMPLE_RATE),
            buffer_size: cpal::BufferSize::Default,
        };

        let (producer, mut consumer): (Producer<i16>, Consumer<i16>) =
            RingBuffer::new(2 * BLOCK_FRAMES * RING_BLOCKS);

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [i16], _info: &cpal::OutputCallbackInfo| {
                    for sample in data.iter_mut() {
                        *sample = consumer.pop().unwrap_or(0);
                    }
                },
                move |err| log::error!("cpal output stream error: {err}"),
                None,
            )
            .map_err(|_| EngineError::InvalidParameter("failed to build cpal output stream"))?;

        stream.play().map_err(|_| EngineError::InvalidParameter("failed to start cpal output stream"))?;

        Ok(Self { producer, _stream: stream })
    }
}

impl AudioSink for CpalSink {
    fn write_block(&mut self, frames: &[i16; 2 * BLOCK_FRAMES]) -> EngineResult<()> {
        for &sample in frames.iter() {
            while self.producer.push(sample).is_err() {
                std::thread::yield_now();
            }
        }
        Ok(())
    }
}
