// src/types.rs
use std::str::FromStr;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use crate::analysis::Classification;

// 数据流的描述信息
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StreamInfo {
    pub name: String,
    pub channel_count: usize,
    pub sample_rate_hz: f64,
}

// y 轴范围 (微伏)
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AxisLimits {
    pub min: f64,
    pub max: f64,
}

impl Default for AxisLimits {
    fn default() -> Self {
        Self { min: 0.0, max: 100.0 }
    }
}

// 控制端发给后台的命令
#[derive(Clone, Debug, PartialEq)]
pub enum ControlCommand {
    SetUpdateInterval(f64),
    SelectChannel(usize),
    SetYLimits(AxisLimits),
    SetSquared(bool),
    // 保存当前录制, 参数为文件名 (不含扩展名)
    Save(String),
    Shutdown,
}

// 控制台文本命令, 例如 "channel 3", "ylim -10 10", "save 1"
impl FromStr for ControlCommand {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let verb = words.next().ok_or_else(|| "empty command".to_owned())?;
        let args: Vec<&str> = words.collect();
        let number = |i: usize| -> Result<f64, String> {
            let word = args.get(i).ok_or_else(|| format!("'{verb}' needs a value"))?;
            word.parse::<f64>().map_err(|_| format!("'{word}' is not a number"))
        };
        match verb {
            "interval" => Ok(Self::SetUpdateInterval(number(0)?)),
            "channel" => {
                let word = args.first().ok_or_else(|| "'channel' needs a value".to_owned())?;
                word.parse()
                    .map(Self::SelectChannel)
                    .map_err(|_| format!("'{word}' is not a channel number"))
            }
            "ylim" => {
                let (min, max) = (number(0)?, number(1)?);
                if !(max > min) {
                    return Err(format!("y limits must be increasing, got {min} {max}"));
                }
                Ok(Self::SetYLimits(AxisLimits { min, max }))
            }
            "squared" => match args.first().copied() {
                Some("on" | "1" | "true") => Ok(Self::SetSquared(true)),
                Some("off" | "0" | "false") => Ok(Self::SetSquared(false)),
                _ => Err("'squared' takes on or off".to_owned()),
            },
            "save" => match args.as_slice() {
                [name] => Ok(Self::Save((*name).to_owned())),
                _ => Err("'save' takes one file name".to_owned()),
            },
            "quit" | "exit" => Ok(Self::Shutdown),
            other => Err(format!("unknown command '{other}'")),
        }
    }
}

// 后台发给控制台的消息
#[derive(Clone, Debug)]
pub enum ConsoleMessage {
    Log(String),
    Classification(Classification),
}

// 每个周期的平均波形 (选中通道)
#[derive(Clone, Debug)]
pub struct WaveformFrame {
    pub class_ids: Vec<u32>,
    pub trial_counts: Vec<usize>,
    pub channel: usize,
    pub sample_rate_hz: f64,
    pub squared: bool,
    /// classes x samples
    pub waveforms: Array2<f64>,
}

impl WaveformFrame {
    pub fn class_count(&self) -> usize {
        self.waveforms.nrows()
    }

    pub fn trial_len(&self) -> usize {
        self.waveforms.ncols()
    }

    /// Time axis in milliseconds after stimulus onset.
    pub fn time_axis_ms(&self) -> Vec<f64> {
        (0..self.trial_len())
            .map(|i| i as f64 / self.sample_rate_hz * 1000.0)
            .collect()
    }
}
