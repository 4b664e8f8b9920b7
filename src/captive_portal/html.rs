//! 内嵌 HTML 页面

pub const FORM_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>WiFi Setup</title>
    <style>
        * { box-sizing: border-box; margin: 0; padding: 0; }
        body {
            font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, sans-serif;
            background: #1a1a2e;
            color: #eee;
            min-height: 100vh;
            padding: 20px;
        }
        .container {
            max-width: 400px;
            margin: 0 auto;
        }
        h1 {
            text-align: center;
            margin-bottom: 24px;
            font-size: 24px;
            color: #00d4ff;
        }
        .form-group {
            margin-bottom: 16px;
        }
        label {
            display: block;
            margin-bottom: 6px;
            font-size: 14px;
            color: #aaa;
        }
        input {
            width: 100%;
            padding: 12px;
            border: 1px solid #333;
            border-radius: 8px;
            background: #16213e;
            color: #fff;
            font-size: 16px;
        }
        input:focus {
            outline: none;
            border-color: #00d4ff;
        }
        button {
            width: 100%;
            margin-top: 24px;
            padding: 14px;
            border: none;
            border-radius: 8px;
            font-size: 16px;
            min-height: 48px;
            background: #00d4ff;
            color: #1a1a2e;
            font-weight: bold;
            cursor: pointer;
        }
    </style>
</head>
<body>
    <div class="container">
        <h1>WiFi Setup</h1>
        <form action="/config" method="POST">
            <div class="form-group">
                <label for="ssid">WiFi network</label>
                <input type="text" id="ssid" name="ssid" placeholder="WiFi SSID" required>
            </div>
            <div class="form-group">
                <label for="password">WiFi password</label>
                <input type="password" id="password" name="password" placeholder="WiFi password" required>
            </div>
            <button type="submit">Save</button>
        </form>
    </div>
</body>
</html>"#;

pub const SUCCESS_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>WiFi Setup</title>
    <style>
        * { box-sizing: border-box; margin: 0; padding: 0; }
        body {
            font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, sans-serif;
            background: #1a1a2e;
            color: #eee;
            min-height: 100vh;
            padding: 20px;
        }
        .box {
            max-width: 400px;
            margin: 30vh auto 0;
            padding: 16px;
            border-radius: 8px;
            text-align: center;
            background: #1e4d2b;
            color: #4ade80;
        }
    </style>
</head>
<body>
    <div class="box">
        <p>WiFi credentials saved. The device is restarting...</p>
    </div>
</body>
</html>"#;

pub const ERROR_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>WiFi Setup</title>
    <style>
        * { box-sizing: border-box; margin: 0; padding: 0; }
        body {
            font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, sans-serif;
            background: #1a1a2e;
            color: #eee;
            min-height: 100vh;
            padding: 20px;
        }
        .box {
            max-width: 400px;
            margin: 30vh auto 0;
            padding: 16px;
            border-radius: 8px;
            text-align: center;
            background: #4d1e1e;
            color: #f87171;
        }
        a {
            display: inline-block;
            margin-top: 16px;
            padding: 8px 16px;
            border-radius: 8px;
            text-decoration: none;
            background: #00d4ff;
            color: #1a1a2e;
            font-weight: bold;
        }
    </style>
</head>
<body>
    <div class="box">
        <p>Something went wrong while saving the WiFi SSID and password.</p>
        <a href="/">&#x00AB; Go back</a>
    </div>
</body>
</html>"#;
