// src/main.rs
mod analysis;
mod config;
mod engine;
mod recorder;
mod simulator;
mod types;
use std::fs;
use std::io::{self, BufRead};
use std::path::Path;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use anyhow::{Context, Result};
use log::{info, warn};
use analysis::{render_class_grid_png, spawn_feed, MarkerFeed, PlotStyle, RecordedData, SampleFeed};
use config::{AnalyzerConfig, SettingsHandle};
use engine::{AnalysisEngine, CancellationToken, EngineOutputs};
use simulator::SyntheticParadigm;
use types::*;
// 读取配置: 第一个参数是 JSON 配置文件路径, 没有则使用默认值
fn load_config() -> Result<AnalyzerConfig> {
    match std::env::args().nth(1) {
        Some(path) => AnalyzerConfig::load(Path::new(&path)),
        None => {
            info!("no config file given, using defaults");
            Ok(AnalyzerConfig::default())
        }
    }
}
// 控制台输入线程: 每行一个命令
fn spawn_stdin_commands(tx_cmd: mpsc::Sender<ControlCommand>) {
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            match line.parse::<ControlCommand>() {
                Ok(cmd) => {
                    let quit = cmd == ControlCommand::Shutdown;
                    if tx_cmd.send(cmd).is_err() || quit {
                        break;
                    }
                }
                Err(e) => println!("{e}"),
            }
        }
    });
}
fn write_plot(path: &Path, png: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(path, png).with_context(|| format!("failed to write plot {}", path.display()))
}
// 入口函数
fn main() -> Result<()> {
    env_logger::init();
    let config = load_config()?;
    let stream = &config.stream;
    // 1. 采集存储 (可选带通滤波)
    let store = Arc::new(RecordedData::new(config.filter.settings()));
    store
        .set_sample_rate(stream.sample_rate_hz)
        .context("invalid stream samplerate")?;
    store.set_channel_count(stream.channel_count);
    let cancel = CancellationToken::new();
    // 2. 数据源 (模拟范式)
    let (continuous, markers) = SyntheticParadigm::new(stream, &config.simulator).into_inlets();
    println!(
        "Connected! There are {} channels with a samplerate of {}Hz",
        stream.channel_count, stream.sample_rate_hz
    );
    let feeds = [
        spawn_feed(continuous, SampleFeed::new(store.clone()), cancel.clone()),
        spawn_feed(markers, MarkerFeed::new(store.clone()), cancel.clone()),
    ];
    // 3. 分析线程和控制线程
    let settings = SettingsHandle::new(config.runtime.clone());
    let (tx_wave, rx_wave) = mpsc::channel();
    let (tx_axis, rx_axis) = mpsc::channel();
    let (tx_console, rx_console) = mpsc::channel();
    let outputs = EngineOutputs {
        waveform: tx_wave,
        axis: tx_axis,
        console: tx_console.clone(),
    };
    let engine = AnalysisEngine::new(
        store.clone(),
        settings.clone(),
        stream.class_count(),
        outputs,
        cancel.clone(),
    );
    let analysis = engine::spawn_thread(engine);
    let (tx_cmd, rx_cmd) = mpsc::channel();
    engine::spawn_control(
        rx_cmd,
        settings,
        store,
        config.output.recording_dir.clone(),
        tx_console,
        cancel.clone(),
    );
    spawn_stdin_commands(tx_cmd);
    println!("commands: interval <s> | channel <n> | ylim <min> <max> | squared on|off | save <name> | quit");
    // 4. 主线程消费结果: 控制台输出 + 绘图
    let style = PlotStyle::default();
    let mut limits = config.runtime.y_limits;
    let mut winner = None;
    while !cancel.is_cancelled() {
        match rx_console.recv_timeout(Duration::from_millis(100)) {
            Ok(ConsoleMessage::Log(line)) => println!("{line}"),
            Ok(ConsoleMessage::Classification(result)) => winner = result.winner(),
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
        if let Some(latest) = rx_axis.try_iter().last() {
            println!("axis changed");
            limits = latest;
        }
        if let Some(frame) = rx_wave.try_iter().last() {
            let png = render_class_grid_png(&frame, limits, stream.rows, stream.cols, winner, &style);
            match png.map_err(anyhow::Error::from).and_then(|png| write_plot(&config.output.plot_path, &png)) {
                Ok(()) => info!("plot updated: {}", config.output.plot_path.display()),
                Err(e) => warn!("plot not updated: {e:#}"),
            }
        }
    }
    cancel.cancel();
    analysis.join().ok();
    for feed in feeds {
        if let Ok(count) = feed.join() {
            info!("feed stopped after {count} values");
        }
    }
    Ok(())
}
