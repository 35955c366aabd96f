use std::time::Duration;

use memchart::{buffer::SharedBuffer, server, Fields, MEMORY_FREE, MEMORY_USED};
use tokio::sync::oneshot;

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn get(url: String) -> (u16, String) {
    tokio::task::spawn_blocking(move || {
        let resp = match ureq::get(&url).call() {
            Ok(resp) => resp,
            Err(ureq::Error::Status(_, resp)) => resp,
            Err(e) => panic!("{url}: {e}"),
        };
        let status = resp.status();
        (status, resp.into_string().unwrap())
    })
    .await
    .unwrap()
}

async fn wait_until_up(base: &str) {
    for _ in 0..50 {
        let url = format!("{base}/healthz");
        let up = tokio::task::spawn_blocking(move || ureq::get(&url).call().is_ok())
            .await
            .unwrap();
        if up {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("server at {base} never came up");
}

#[tokio::test]
async fn serves_health_and_charts() {
    let buffer = SharedBuffer::default();
    let now = memchart::now();
    for i in 0..10 {
        let fields = Fields::from([
            (MEMORY_FREE.into(), 1000.0 + i as f64),
            (MEMORY_USED.into(), 2000.0 - i as f64),
        ]);
        buffer.insert(Some(now - i * 60), fields);
    }

    let addr = format!("127.0.0.1:{}", free_port());
    let base = format!("http://{addr}");
    let (stop, stopped) = oneshot::channel::<()>();
    let server = tokio::spawn({
        let addr = addr.clone();
        async move {
            server::serve(&addr, buffer, async {
                let _ = stopped.await;
            })
            .await
        }
    });
    wait_until_up(&base).await;

    let (status, body) = get(format!("{base}/healthz")).await;
    assert_eq!(status, 200);
    assert_eq!(body, "OK");

    let (status, body) = get(format!("{base}/")).await;
    assert_eq!(status, 200);
    assert!(body.contains("Memory Usage (Last 24 hours)"));
    assert!(body.contains("Memory Free"));

    let (status, body) = get(format!("{base}/?view=monthly")).await;
    assert_eq!(status, 200);
    assert!(body.contains("3-hourly mean"));

    let (status, _) = get(format!("{base}/?view=yearly")).await;
    assert_eq!(status, 400);

    stop.send(()).unwrap();
    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn empty_buffer_renders_empty_chart() {
    let addr = format!("127.0.0.1:{}", free_port());
    let base = format!("http://{addr}");
    let (stop, stopped) = oneshot::channel::<()>();
    let server = tokio::spawn({
        let addr = addr.clone();
        async move {
            server::serve(&addr, SharedBuffer::default(), async {
                let _ = stopped.await;
            })
            .await
        }
    });
    wait_until_up(&base).await;

    for view in ["daily", "weekly", "monthly"] {
        let (status, body) = get(format!("{base}/?view={view}")).await;
        assert_eq!(status, 200);
        assert!(body.contains("memory-chart"));
    }

    stop.send(()).unwrap();
    server.await.unwrap().unwrap();
}
